use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::{Tool, ToolOutput, ToolParam, ToolSpec};

/// Deterministic "not available in this deployment" stub, kept so the
/// Gateway's tool-calling loop and reinforcement bookkeeping always have a
/// real trait object to exercise for tools this deployment doesn't wire up
/// to a live backend.
macro_rules! stub_tool {
    ($ty:ident, $name:literal, $desc:literal, [$($param:literal => $pdesc:literal),* $(,)?]) => {
        pub struct $ty;

        #[async_trait]
        impl Tool for $ty {
            fn spec(&self) -> ToolSpec {
                ToolSpec {
                    name: $name.to_string(),
                    description: $desc.to_string(),
                    params: vec![$(ToolParam {
                        name: $param.to_string(),
                        description: $pdesc.to_string(),
                        required: true,
                    }),*],
                }
            }

            async fn run(&self, _args: &HashMap<String, String>) -> Result<ToolOutput> {
                Ok(ToolOutput {
                    success: false,
                    output: "not available in this deployment".to_string(),
                })
            }
        }
    };
}

stub_tool!(
    WeatherTool,
    "get_weather",
    "Looks up current weather for a location.",
    ["location" => "city or place name"]
);

stub_tool!(
    CurrencyTool,
    "convert_currency",
    "Converts an amount between currencies.",
    ["from" => "source currency code", "to" => "target currency code", "amount" => "amount to convert"]
);

stub_tool!(
    CalculatorTool,
    "calculate",
    "Evaluates a numeric expression.",
    ["expression" => "arithmetic expression to evaluate"]
);

stub_tool!(
    WebSearchTool,
    "web_search",
    "Searches the web for a query.",
    ["query" => "search terms"]
);

stub_tool!(
    ImageGenerationTool,
    "generate_image",
    "Generates an image from a text prompt.",
    ["prompt" => "image description"]
);

stub_tool!(
    PollsTool,
    "create_poll",
    "Creates a poll in the current chat.",
    ["question" => "poll question", "options" => "comma-separated poll options"]
);

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_tools_report_unavailable() {
        let tools: Vec<Box<dyn Tool>> = vec![
            Box::new(WeatherTool),
            Box::new(CurrencyTool),
            Box::new(CalculatorTool),
            Box::new(WebSearchTool),
            Box::new(ImageGenerationTool),
            Box::new(PollsTool),
        ];
        for tool in tools {
            let out = tool.run(&HashMap::new()).await.unwrap();
            assert!(!out.success);
            assert_eq!(out.output, "not available in this deployment");
            assert!(!tool.spec().name.is_empty());
        }
    }
}
