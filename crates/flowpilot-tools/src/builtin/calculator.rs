use futures::future::BoxFuture;
use serde::Deserialize;

use flowpilot_core::error::{FlowError, Result};
use flowpilot_core::traits::Tool;
use flowpilot_core::types::{ToolContext, ToolResult};

pub struct CalculatorTool;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Operation {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
}

#[derive(Deserialize)]
struct CalculatorInput {
    operation: Operation,
    a: f64,
    b: f64,
}

impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Perform basic arithmetic on two numbers: add, subtract, multiply, divide or power."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["add", "subtract", "multiply", "divide", "power"]
                },
                "a": { "type": "number", "description": "Left operand" },
                "b": { "type": "number", "description": "Right operand" }
            },
            "required": ["operation", "a", "b"]
        })
    }

    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let params: CalculatorInput = serde_json::from_value(input)
                .map_err(|e| FlowError::ToolValidation(e.to_string()))?;

            let value = match params.operation {
                Operation::Add => params.a + params.b,
                Operation::Subtract => params.a - params.b,
                Operation::Multiply => params.a * params.b,
                Operation::Divide => {
                    if params.b == 0.0 {
                        return Ok(ToolResult::error("Division by zero"));
                    }
                    params.a / params.b
                }
                Operation::Power => params.a.powf(params.b),
            };

            if !value.is_finite() {
                return Ok(ToolResult::error(format!(
                    "{:?} produced a non-finite result",
                    params.operation
                )));
            }

            Ok(ToolResult::success(format_number(value)))
        })
    }
}

/// Whole numbers print without a trailing `.0`.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
