//! Arithmetic over `+ - * / ( )` with the usual precedence, evaluated by
//! recursive descent. Nothing is shelled out.

use futures::future::BoxFuture;
use serde::Deserialize;

use agentflow_core::error::{AgentFlowError, Result};
use agentflow_core::traits::Tool;

use super::{invalid_params, param_or_input};

pub struct CalculateTool;

#[derive(Deserialize)]
struct CalculateInput {
    #[serde(default)]
    expression: Option<String>,
    #[serde(default)]
    input: Option<String>,
}

impl Tool for CalculateTool {
    fn name(&self) -> &str {
        "calculate"
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression with + - * / and parentheses."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "expression": { "type": "string", "description": "Expression, e.g. (2 + 3) * 4" },
                "input": { "type": "string", "description": "Used when expression is absent" }
            }
        })
    }

    fn timeout_secs(&self) -> u64 {
        5
    }

    fn execute(&self, input: serde_json::Value) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let p: CalculateInput =
                serde_json::from_value(input).map_err(|e| invalid_params("calculate", e))?;
            let expr = param_or_input(&p.expression, &p.input).ok_or_else(|| {
                AgentFlowError::ToolExecution {
                    tool: "calculate".into(),
                    message: "expression is required".into(),
                }
            })?;

            let value = evaluate(expr).map_err(|message| AgentFlowError::ToolExecution {
                tool: "calculate".into(),
                message,
            })?;

            Ok(serde_json::json!({
                "expression": expr.trim(),
                "result": format_number(value),
            })
            .to_string())
        })
    }
}

/// Integral results print without a fractional part.
fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

pub fn evaluate(expr: &str) -> std::result::Result<f64, String> {
    let mut parser = Parser {
        chars: expr.chars().filter(|c| !c.is_whitespace()).collect(),
        pos: 0,
    };
    if parser.chars.is_empty() {
        return Err("empty expression".into());
    }
    let value = parser.expr()?;
    if let Some(c) = parser.peek() {
        return Err(format!("unexpected '{}' at position {}", c, parser.pos));
    }
    if !value.is_finite() {
        return Err("result is not a finite number".into());
    }
    Ok(value)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        self.pos += 1;
        c
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> std::result::Result<f64, String> {
        let mut value = self.term()?;
        while let Some(op @ ('+' | '-')) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            if op == '+' {
                value += rhs;
            } else {
                value -= rhs;
            }
        }
        Ok(value)
    }

    // term := factor (('*' | '/') factor)*
    fn term(&mut self) -> std::result::Result<f64, String> {
        let mut value = self.factor()?;
        while let Some(op @ ('*' | '/')) = self.peek() {
            self.pos += 1;
            let rhs = self.factor()?;
            if op == '*' {
                value *= rhs;
            } else {
                if rhs == 0.0 {
                    return Err("division by zero".into());
                }
                value /= rhs;
            }
        }
        Ok(value)
    }

    // factor := '-' factor | '+' factor | '(' expr ')' | number
    fn factor(&mut self) -> std::result::Result<f64, String> {
        match self.peek() {
            Some('-') => {
                self.pos += 1;
                Ok(-self.factor()?)
            }
            Some('+') => {
                self.pos += 1;
                self.factor()
            }
            Some('(') => {
                self.pos += 1;
                let value = self.expr()?;
                match self.bump() {
                    Some(')') => Ok(value),
                    _ => Err("missing closing parenthesis".into()),
                }
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(c) => Err(format!("unexpected '{}' at position {}", c, self.pos)),
            None => Err("unexpected end of expression".into()),
        }
    }

    fn number(&mut self) -> std::result::Result<f64, String> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
            self.pos += 1;
        }
        let literal: String = self.chars[start..self.pos].iter().collect();
        literal
            .parse::<f64>()
            .map_err(|_| format!("invalid number '{}'", literal))
    }
}
