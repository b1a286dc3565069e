// 🏷️ Processing Rules - Rules as Data
// Discriminators pick the rule, extraction steps pull fields out of the body.
// Rules are compiled once at load time and never change afterwards.

use crate::error::ConfigError;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Deserializer, Serialize};

/// Format used for transactionDate bindings that don't name one (MM/DD/YY)
pub const DEFAULT_DATE_FORMAT: &str = "%m/%d/%y";

// ============================================================================
// RULE DEFINITION (as written in the config file)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingRule {
    /// Human-readable name, used in diagnostics
    #[serde(default)]
    pub option_name: Option<String>,

    pub discriminator: Discriminator,

    /// Ledger account the money comes out of
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub source_account_id: String,

    #[serde(default)]
    pub extraction_steps: Vec<ExtractionStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Discriminator {
    /// Body matches the regex (case-sensitive, whole body at once)
    PlainTextBodyRegex { regex: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionStep {
    pub regex: String,

    #[serde(default)]
    pub target_fields: Vec<FieldBinding>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldBinding {
    pub group_number: usize,
    pub target_field: TargetField,

    /// chrono format string, transactionDate only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// IANA zone name, required for transactionDate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TargetField {
    Dollars,
    Cents,
    TransactionDate,
    DestinationAccount,
}

fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(u64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

// ============================================================================
// COMPILED RULES
// ============================================================================

/// A field binding after validation. Date bindings always carry a zone.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Dollars { group: usize },
    Cents { group: usize },
    TransactionDate {
        group: usize,
        format: String,
        time_zone: String,
    },
    DestinationAccount { group: usize },
}

impl Binding {
    pub fn group(&self) -> usize {
        match self {
            Binding::Dollars { group }
            | Binding::Cents { group }
            | Binding::TransactionDate { group, .. }
            | Binding::DestinationAccount { group } => *group,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompiledStep {
    pub(crate) pattern: String,
    pub(crate) regex: Regex,
    pub(crate) bindings: Vec<Binding>,
}

impl CompiledStep {
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }
}

#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub(crate) name: String,
    pub(crate) discriminator: Regex,
    pub(crate) source_account_id: String,
    pub(crate) steps: Vec<CompiledStep>,
}

impl CompiledRule {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_account_id(&self) -> &str {
        &self.source_account_id
    }

    pub fn steps(&self) -> &[CompiledStep] {
        &self.steps
    }

    /// Check whether this rule's discriminator accepts the body
    pub fn matches(&self, body: &str) -> bool {
        self.discriminator.is_match(body)
    }

    fn compile(index: usize, rule: &ProcessingRule) -> Result<Self, ConfigError> {
        let name = rule
            .option_name
            .clone()
            .unwrap_or_else(|| format!("rule #{}", index + 1));

        let discriminator = match &rule.discriminator {
            Discriminator::PlainTextBodyRegex { regex } => {
                Regex::new(regex).map_err(|source| ConfigError::InvalidPattern {
                    rule: name.clone(),
                    pattern: regex.clone(),
                    source,
                })?
            }
        };

        let mut steps = Vec::with_capacity(rule.extraction_steps.len());
        for step in &rule.extraction_steps {
            steps.push(compile_step(&name, step)?);
        }

        Ok(CompiledRule {
            name,
            discriminator,
            source_account_id: rule.source_account_id.clone(),
            steps,
        })
    }
}

fn compile_step(rule: &str, step: &ExtractionStep) -> Result<CompiledStep, ConfigError> {
    // ^ and $ anchor at line boundaries so steps can target "Field: value" lines
    let regex = RegexBuilder::new(&step.regex)
        .multi_line(true)
        .build()
        .map_err(|source| ConfigError::InvalidPattern {
            rule: rule.to_string(),
            pattern: step.regex.clone(),
            source,
        })?;

    let available = regex.captures_len();
    let mut bindings = Vec::with_capacity(step.target_fields.len());

    for field in &step.target_fields {
        let group = field.group_number;
        if group >= available {
            return Err(ConfigError::GroupOutOfRange {
                rule: rule.to_string(),
                pattern: step.regex.clone(),
                group,
                available: available - 1,
            });
        }

        let binding = match field.target_field {
            TargetField::Dollars => Binding::Dollars { group },
            TargetField::Cents => Binding::Cents { group },
            TargetField::DestinationAccount => Binding::DestinationAccount { group },
            TargetField::TransactionDate => {
                let time_zone = field.time_zone.clone().ok_or_else(|| {
                    ConfigError::MissingTimeZone {
                        rule: rule.to_string(),
                        group,
                    }
                })?;
                Binding::TransactionDate {
                    group,
                    format: field
                        .format
                        .clone()
                        .unwrap_or_else(|| DEFAULT_DATE_FORMAT.to_string()),
                    time_zone,
                }
            }
        };
        bindings.push(binding);
    }

    Ok(CompiledStep {
        pattern: step.regex.clone(),
        regex,
        bindings,
    })
}

// ============================================================================
// RULE SET
// ============================================================================

/// Ordered, immutable set of compiled rules. Order is the configured order.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// Compile rules, rejecting bad patterns and incomplete date bindings
    pub fn compile(rules: &[ProcessingRule]) -> Result<Self, ConfigError> {
        let rules = rules
            .iter()
            .enumerate()
            .map(|(i, rule)| CompiledRule::compile(i, rule))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RuleSet { rules })
    }

    /// First rule whose discriminator matches (not the best one)
    pub fn select(&self, body: &str) -> Option<&CompiledRule> {
        self.rules.iter().find(|rule| rule.matches(body))
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    /// Get number of rules loaded
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

// ============================================================================
// TESTS
// ============================================================================
