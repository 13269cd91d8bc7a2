use rust_stemmers::Algorithm;

use crate::analysis::filter::TokenFilter;
use crate::analysis::filters::lowercase::LowercaseFilter;
use crate::analysis::filters::stemmer::StemmerFilter;
use crate::analysis::token::Token;
use crate::analysis::tokenizer::{StandardTokenizer, Tokenizer};
use crate::core::error::{Error, Result};

/// Text analysis pipeline
pub struct Analyzer {
    pub tokenizer: Box<dyn Tokenizer>,
    pub filters: Vec<Box<dyn TokenFilter>>,
}

impl Analyzer {
    pub fn new(tokenizer: Box<dyn Tokenizer>) -> Self {
        Analyzer {
            tokenizer,
            filters: Vec::new(),
        }
    }

    pub fn add_filter(mut self, filter: Box<dyn TokenFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn analyze(&self, text: &str) -> Vec<Token> {
        let mut tokens = self.tokenizer.tokenize(text);

        for filter in &self.filters {
            tokens = filter.filter(tokens);
        }

        tokens
    }

    /// Lowercasing tokenizer with no further processing.
    pub fn plain() -> Self {
        Analyzer::new(Box::new(StandardTokenizer::default())).add_filter(Box::new(LowercaseFilter))
    }

    /// Build the analyzer for a schema field processor name.
    ///
    /// The empty name is the plain analyzer; `stem_<lang>` adds a snowball
    /// stemmer for the named language.
    pub fn for_processor(processor: &str) -> Result<Self> {
        if processor.is_empty() {
            return Ok(Analyzer::plain());
        }
        let lang = processor
            .strip_prefix("stem_")
            .ok_or_else(|| Error::invalid_value(format!("unknown processor '{}'", processor)))?;
        let algorithm = match lang {
            "en" => Algorithm::English,
            "ar" => Algorithm::Arabic,
            "da" => Algorithm::Danish,
            "nl" => Algorithm::Dutch,
            "fi" => Algorithm::Finnish,
            "fr" => Algorithm::French,
            "de" => Algorithm::German,
            "el" => Algorithm::Greek,
            "hu" => Algorithm::Hungarian,
            "it" => Algorithm::Italian,
            "no" => Algorithm::Norwegian,
            "pt" => Algorithm::Portuguese,
            "ro" => Algorithm::Romanian,
            "ru" => Algorithm::Russian,
            "es" => Algorithm::Spanish,
            "sv" => Algorithm::Swedish,
            "tr" => Algorithm::Turkish,
            _ => {
                return Err(Error::invalid_value(format!(
                    "unknown stemmer language '{}'",
                    lang
                )))
            }
        };
        Ok(Analyzer::plain().add_filter(Box::new(StemmerFilter::new(algorithm))))
    }
}

impl Clone for Analyzer {
    fn clone(&self) -> Self {
        Analyzer {
            tokenizer: self.tokenizer.clone_box(),
            filters: self.filters.iter().map(|f| f.clone_box()).collect(),
        }
    }
}
