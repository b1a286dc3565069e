// 🧭 Account Resolver - Free-text counterparty → known account
//
// Two passes over every account, no early exit:
//   1. Substring overlap: longest common substring of the clean names
//   2. Edit distance: case-folded Levenshtein on the raw names
// Overlap wins when it is confident; otherwise a close edit distance;
// otherwise no match (the caller books against the fallback counterparty).

use crate::entities::{AccountIndex, AccountRecord};
use crate::entities::account::clean_name;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

// ============================================================================
// THRESHOLDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchThresholds {
    /// Overlap length that is accepted outright (default: 5)
    pub min_overlap_length: usize,

    /// Overlap / clean query length that is accepted (default: 0.75)
    pub min_overlap_ratio: f64,

    /// Largest edit distance accepted (default: 3)
    pub max_edit_distance: usize,
}

impl Default for MatchThresholds {
    fn default() -> Self {
        MatchThresholds {
            min_overlap_length: 5,
            min_overlap_ratio: 0.75,
            max_edit_distance: 3,
        }
    }
}

impl MatchThresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.min_overlap_ratio.is_finite() || self.min_overlap_ratio < 0.0 {
            return Err(ConfigError::InvalidThreshold(format!(
                "minOverlapRatio must be a non-negative number, got {}",
                self.min_overlap_ratio
            )));
        }
        Ok(())
    }
}

// ============================================================================
// RESOLUTION RESULT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution<'a> {
    /// Matched through substring overlap of clean names
    Overlap {
        account: &'a AccountRecord,
        length: usize,
    },

    /// Matched through edit distance of raw names
    EditDistance {
        account: &'a AccountRecord,
        distance: usize,
    },

    NoMatch,
}

impl<'a> Resolution<'a> {
    pub fn account(&self) -> Option<&'a AccountRecord> {
        match self {
            Resolution::Overlap { account, .. } | Resolution::EditDistance { account, .. } => {
                Some(account)
            }
            Resolution::NoMatch => None,
        }
    }
}

// ============================================================================
// RESOLVER
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct AccountResolver {
    pub thresholds: MatchThresholds,
}

impl AccountResolver {
    pub fn new(thresholds: MatchThresholds) -> Self {
        AccountResolver { thresholds }
    }

    /// Find the account that best matches `name`.
    ///
    /// Ties in either pass keep the account that appears first in the index.
    pub fn resolve<'a>(&self, name: &str, index: &'a AccountIndex) -> Resolution<'a> {
        let clean_query = clean_name(name);
        let query_len = clean_query.chars().count();

        let mut best_overlap: Option<(&AccountRecord, usize)> = None;
        let mut best_edit: Option<(&AccountRecord, usize)> = None;

        for (account, clean_account) in index.entries() {
            let overlap = longest_common_substring(&clean_query, clean_account);
            if overlap > best_overlap.map_or(0, |(_, len)| len) {
                best_overlap = Some((account, overlap));
            }

            let distance = levenshtein_distance(name, &account.name);
            if best_edit.map_or(true, |(_, best)| distance < best) {
                best_edit = Some((account, distance));
            }
        }

        if let Some((account, length)) = best_overlap {
            // length > 0 here, so query_len > 0
            let ratio = length as f64 / query_len as f64;
            if length >= self.thresholds.min_overlap_length
                || ratio >= self.thresholds.min_overlap_ratio
            {
                return Resolution::Overlap { account, length };
            }
        }

        if let Some((account, distance)) = best_edit {
            if distance <= self.thresholds.max_edit_distance {
                return Resolution::EditDistance { account, distance };
            }
        }

        Resolution::NoMatch
    }
}

// ============================================================================
// STRING METRICS
// ============================================================================

/// Levenshtein distance, ignoring case
///
/// Levenshtein distance = minimum number of single-character edits
/// (insertions, deletions, substitutions) to change one string into another
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let s1_chars: Vec<char> = s1.chars().flat_map(char::to_lowercase).collect();
    let s2_chars: Vec<char> = s2.chars().flat_map(char::to_lowercase).collect();
    let len1 = s1_chars.len();
    let len2 = s2_chars.len();

    let mut matrix = vec![vec![0; len2 + 1]; len1 + 1];

    for (i, row) in matrix.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=len2 {
        matrix[0][j] = j;
    }

    for i in 1..=len1 {
        for j in 1..=len2 {
            let cost = if s1_chars[i - 1] == s2_chars[j - 1] { 0 } else { 1 };

            matrix[i][j] = std::cmp::min(
                std::cmp::min(
                    matrix[i - 1][j] + 1, // deletion
                    matrix[i][j - 1] + 1, // insertion
                ),
                matrix[i - 1][j - 1] + cost, // substitution
            );
        }
    }

    matrix[len1][len2]
}

/// Length (in characters) of the longest contiguous run shared by both strings
pub fn longest_common_substring(s1: &str, s2: &str) -> usize {
    let s1_chars: Vec<char> = s1.chars().collect();
    let s2_chars: Vec<char> = s2.chars().collect();

    let mut previous = vec![0usize; s2_chars.len() + 1];
    let mut longest = 0;

    for a in &s1_chars {
        let mut current = vec![0usize; s2_chars.len() + 1];
        for (j, b) in s2_chars.iter().enumerate() {
            if a == b {
                current[j + 1] = previous[j] + 1;
                longest = longest.max(current[j + 1]);
            }
        }
        previous = current;
    }

    longest
}

// ============================================================================
// TESTS
// ============================================================================
