pub mod strategies;

pub use strategies::{
    BoundaryScanStrategy, DirectStrategy, ExtractStrategy, FencedBlockStrategy,
};

use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("response extractor requires at least one strategy")]
    NoStrategies,
}

/// Result of one `parse` call. A failed outcome never carries data.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    pub success: bool,
    pub data: Option<Value>,
    pub strategy_used: Option<String>,
    pub diagnostics: Vec<String>,
}

impl ParseOutcome {
    fn failure(diagnostics: Vec<String>) -> Self {
        Self {
            success: false,
            data: None,
            strategy_used: None,
            diagnostics,
        }
    }
}

/// Recovers structured data from free-text model output by running an
/// ordered list of fallback strategies. The first strategy to yield a JSON
/// object or array wins; `parse` itself never fails.
pub struct ResponseExtractor {
    strategies: Vec<Box<dyn ExtractStrategy>>,
}

impl ResponseExtractor {
    pub fn new(strategies: Vec<Box<dyn ExtractStrategy>>) -> Result<Self, ExtractError> {
        if strategies.is_empty() {
            return Err(ExtractError::NoStrategies);
        }
        Ok(Self { strategies })
    }

    pub fn with_default_strategies() -> Self {
        Self {
            strategies: default_strategies(),
        }
    }

    pub fn parse(&self, text: &str) -> ParseOutcome {
        if text.trim().is_empty() {
            return ParseOutcome::failure(vec!["input is empty".to_string()]);
        }

        let mut diagnostics = Vec::new();
        for strategy in &self.strategies {
            match strategy.extract(text) {
                Ok(value) => {
                    return ParseOutcome {
                        success: true,
                        data: Some(value),
                        strategy_used: Some(strategy.name().to_string()),
                        diagnostics,
                    };
                }
                Err(reason) => diagnostics.push(format!("{}: {}", strategy.name(), reason)),
            }
        }

        diagnostics.push("all strategies failed to recover structured data".to_string());
        ParseOutcome::failure(diagnostics)
    }
}

pub fn default_strategies() -> Vec<Box<dyn ExtractStrategy>> {
    vec![
        Box::new(DirectStrategy),
        Box::new(FencedBlockStrategy),
        Box::new(BoundaryScanStrategy),
    ]
}
