//! Arithmetic: expression evaluation and unit conversion.

use super::{Action, ActionContext, ActionError, ParamKind, ParamSpec};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

/// Evaluates a plain arithmetic expression.
pub struct CalculateAction;

#[async_trait]
impl Action for CalculateAction {
    fn name(&self) -> &'static str {
        "calculate"
    }

    fn description(&self) -> &'static str {
        "Evaluate a math expression and return the result"
    }

    fn params(&self) -> &'static [ParamSpec] {
        &[ParamSpec {
            name: "expression",
            kind: ParamKind::String,
            description: "Math expression to evaluate, e.g. '347 * 23'",
            required: true,
        }]
    }

    async fn execute(
        &self,
        args: &Map<String, Value>,
        _ctx: &ActionContext,
    ) -> Result<Value, ActionError> {
        let expression = args["expression"].as_str().unwrap_or_default();
        let result = evaluate(expression).map_err(ActionError::failed)?;
        Ok(json!({ "expression": expression, "result": result }))
    }
}

/// Converts between common distance, weight, temperature, and volume
/// units.
pub struct ConvertUnitsAction;

#[async_trait]
impl Action for ConvertUnitsAction {
    fn name(&self) -> &'static str {
        "convert_units"
    }

    fn description(&self) -> &'static str {
        "Convert between common units (distance, weight, temperature)"
    }

    fn params(&self) -> &'static [ParamSpec] {
        &[
            ParamSpec {
                name: "value",
                kind: ParamKind::Number,
                description: "The numeric value to convert",
                required: true,
            },
            ParamSpec {
                name: "from_unit",
                kind: ParamKind::String,
                description: "Unit to convert from",
                required: true,
            },
            ParamSpec {
                name: "to_unit",
                kind: ParamKind::String,
                description: "Unit to convert to",
                required: true,
            },
        ]
    }

    async fn execute(
        &self,
        args: &Map<String, Value>,
        _ctx: &ActionContext,
    ) -> Result<Value, ActionError> {
        let value = args["value"].as_f64().unwrap_or_default();
        let from = args["from_unit"].as_str().unwrap_or_default().to_lowercase();
        let to = args["to_unit"].as_str().unwrap_or_default().to_lowercase();

        let result = convert(value, &from, &to)
            .ok_or_else(|| ActionError::failed(format!("cannot convert from {from} to {to}")))?;
        Ok(json!({
            "value": value,
            "from": from,
            "to": to,
            "result": (result * 10_000.0).round() / 10_000.0,
        }))
    }
}

fn convert(value: f64, from: &str, to: &str) -> Option<f64> {
    let result = match (from, to) {
        ("miles", "km") => value * 1.609_34,
        ("km", "miles") => value / 1.609_34,
        ("pounds", "kg") => value * 0.453_592,
        ("kg", "pounds") => value / 0.453_592,
        ("fahrenheit", "celsius") => (value - 32.0) * 5.0 / 9.0,
        ("celsius", "fahrenheit") => value * 9.0 / 5.0 + 32.0,
        ("feet", "meters") => value * 0.304_8,
        ("meters", "feet") => value / 0.304_8,
        ("inches", "cm") => value * 2.54,
        ("cm", "inches") => value / 2.54,
        ("gallons", "liters") => value * 3.785_41,
        ("liters", "gallons") => value / 3.785_41,
        ("ounces", "grams") => value * 28.349_5,
        ("grams", "ounces") => value / 28.349_5,
        _ => return None,
    };
    Some(result)
}

// ── Expression evaluation ───────────────────────────────────────────
//
// A small recursive-descent evaluator over + - * / % and parentheses.
// Only these characters are legal, so arbitrary input can never reach
// anything effectful.

fn evaluate(expression: &str) -> Result<f64, String> {
    const ALLOWED: &str = "0123456789+-*/.()% ";
    if let Some(bad) = expression.chars().find(|c| !ALLOWED.contains(*c)) {
        return Err(format!("invalid character in expression: {bad:?}"));
    }
    let tokens: Vec<char> = expression.chars().filter(|c| !c.is_whitespace()).collect();
    if tokens.is_empty() {
        return Err("empty expression".to_owned());
    }
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(format!("unexpected trailing input at offset {}", parser.pos));
    }
    if !value.is_finite() {
        return Err("result is not a finite number".to_owned());
    }
    Ok(value)
}

struct Parser {
    tokens: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.tokens.get(self.pos).copied()
    }

    fn expr(&mut self) -> Result<f64, String> {
        let mut left = self.term()?;
        while let Some(op @ ('+' | '-')) = self.peek() {
            self.pos += 1;
            let right = self.term()?;
            left = if op == '+' { left + right } else { left - right };
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<f64, String> {
        let mut left = self.factor()?;
        while let Some(op @ ('*' | '/' | '%')) = self.peek() {
            self.pos += 1;
            let right = self.factor()?;
            left = match op {
                '*' => left * right,
                '/' => {
                    if right == 0.0 {
                        return Err("division by zero".to_owned());
                    }
                    left / right
                }
                _ => {
                    if right == 0.0 {
                        return Err("modulo by zero".to_owned());
                    }
                    left % right
                }
            };
        }
        Ok(left)
    }

    fn factor(&mut self) -> Result<f64, String> {
        match self.peek() {
            Some('-') => {
                self.pos += 1;
                Ok(-self.factor()?)
            }
            Some('(') => {
                self.pos += 1;
                let value = self.expr()?;
                if self.peek() != Some(')') {
                    return Err("unbalanced parentheses".to_owned());
                }
                self.pos += 1;
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            other => Err(format!("unexpected token: {other:?}")),
        }
    }

    fn number(&mut self) -> Result<f64, String> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
            self.pos += 1;
        }
        let text: String = self.tokens[start..self.pos].iter().collect();
        text.parse::<f64>().map_err(|e| format!("bad number {text:?}: {e}"))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::session::ModeFlags;
    use serde_json::json;

    fn ctx() -> ActionContext {
        ActionContext {
            flags: ModeFlags::default(),
        }
    }

    #[test]
    fn evaluates_basic_arithmetic() {
        assert_eq!(evaluate("347 * 23").unwrap(), 7981.0);
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(evaluate("10 % 3").unwrap(), 1.0);
        assert_eq!(evaluate("-4 + 6").unwrap(), 2.0);
        assert!((evaluate("1 / 3").unwrap() - 0.333_333).abs() < 0.001);
    }

    #[test]
    fn rejects_bad_expressions() {
        assert!(evaluate("").is_err());
        assert!(evaluate("2 +").is_err());
        assert!(evaluate("(2 + 3").is_err());
        assert!(evaluate("1 / 0").is_err());
        assert!(evaluate("import os").is_err());
        assert!(evaluate("2 ** 3").is_err());
    }

    #[tokio::test]
    async fn calculate_action_wraps_result() {
        let args = json!({"expression": "6 * 7"}).as_object().cloned().unwrap();
        let value = CalculateAction.execute(&args, &ctx()).await.unwrap();
        assert_eq!(value["result"], 42.0);
    }

    #[test]
    fn convert_roundtrip() {
        let miles = convert(10.0, "miles", "km").unwrap();
        let back = convert(miles, "km", "miles").unwrap();
        assert!((back - 10.0).abs() < 1e-9);
    }

    #[test]
    fn convert_temperature() {
        assert_eq!(convert(32.0, "fahrenheit", "celsius").unwrap(), 0.0);
        assert_eq!(convert(100.0, "celsius", "fahrenheit").unwrap(), 212.0);
    }

    #[tokio::test]
    async fn convert_unknown_pair_fails() {
        let args = json!({"value": 1.0, "from_unit": "miles", "to_unit": "kg"})
            .as_object()
            .cloned()
            .unwrap();
        assert!(ConvertUnitsAction.execute(&args, &ctx()).await.is_err());
    }
}
