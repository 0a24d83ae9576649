mod memory_tools;
mod stub_tools;

pub use memory_tools::{ForgetMemoryTool, RecallMemoriesTool, RememberMemoryTool, SetPronounsTool};
pub use stub_tools::{
    CalculatorTool, CurrencyTool, ImageGenerationTool, PollsTool, WeatherTool, WebSearchTool,
};
