// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Token-overlap scorer

use super::{record_text, RelevanceScorer};
use brainstore_core::Record;
use regex::Regex;

/// Bonus for records whose kind matches the recall mode
pub const KEYWORD_MODE_BONUS: f64 = 0.1;

/// Lexical scorer: fraction of query tokens found in the record text.
#[derive(Debug, Clone)]
pub struct KeywordScorer {
    splitter: Regex,
}

impl KeywordScorer {
    pub fn new() -> Self {
        Self {
            splitter: Regex::new(r"\W+").unwrap(),
        }
    }

    /// Lowercased word tokens of `text`
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        self.splitter
            .split(&text.to_lowercase())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl Default for KeywordScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl RelevanceScorer for KeywordScorer {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn base_similarity(&self, query: &str, record: &Record) -> f64 {
        let tokens = self.tokenize(query);
        let haystack = record_text(record).to_lowercase();
        let matches = tokens.iter().filter(|t| haystack.contains(t.as_str())).count();
        matches as f64 / tokens.len().max(1) as f64
    }

    fn mode_bonus(&self) -> f64 {
        KEYWORD_MODE_BONUS
    }
}
