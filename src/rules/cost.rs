use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::content::catalog::{Catalog, ChoiceItem};
use crate::rules::counter::counter_multiplier;
use crate::state::selection::Selections;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Currency {
    Blessing,
    Favor,
}

impl Currency {
    pub const ALL: [Currency; 2] = [Currency::Blessing, Currency::Favor];

    pub fn token(self) -> &'static str {
        match self {
            Currency::Blessing => "BP",
            Currency::Favor => "FP",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Currency {
    type Err = CostParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BP" => Ok(Currency::Blessing),
            "FP" => Ok(Currency::Favor),
            _ => Err(CostParseError::UnknownCurrency(s.to_string())),
        }
    }
}

/// A finite countable resource: one of the two currencies or a sigil kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PoolKey {
    Currency(Currency),
    Sigil(String),
}

impl PoolKey {
    pub const BLESSING: PoolKey = PoolKey::Currency(Currency::Blessing);
    pub const FAVOR: PoolKey = PoolKey::Currency(Currency::Favor);

    pub fn sigil(kind: impl Into<String>) -> Self {
        PoolKey::Sigil(kind.into())
    }

    pub fn is_sigil(&self) -> bool {
        matches!(self, PoolKey::Sigil(_))
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolKey::Currency(currency) => write!(f, "{}", currency),
            PoolKey::Sigil(kind) => write!(f, "sigil:{}", kind),
        }
    }
}

impl FromStr for PoolKey {
    type Err = CostParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix("sigil:") {
            Some(kind) if !kind.is_empty() => Ok(PoolKey::Sigil(kind.to_string())),
            Some(_) => Err(CostParseError::UnknownCurrency(s.to_string())),
            None => s.parse::<Currency>().map(PoolKey::Currency),
        }
    }
}

impl TryFrom<String> for PoolKey {
    type Error = CostParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PoolKey> for String {
    fn from(key: PoolKey) -> Self {
        key.to_string()
    }
}

/// Signed change in both currencies. Positive values are spent, negative values refunded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurrencyDelta {
    pub blessing: i64,
    pub favor: i64,
}

impl CurrencyDelta {
    pub const ZERO: CurrencyDelta = CurrencyDelta {
        blessing: 0,
        favor: 0,
    };

    pub fn new(blessing: i64, favor: i64) -> Self {
        Self { blessing, favor }
    }

    pub fn get(self, currency: Currency) -> i64 {
        match currency {
            Currency::Blessing => self.blessing,
            Currency::Favor => self.favor,
        }
    }

    pub fn add_to(&mut self, currency: Currency, amount: i64) {
        match currency {
            Currency::Blessing => self.blessing = self.blessing.saturating_add(amount),
            Currency::Favor => self.favor = self.favor.saturating_add(amount),
        }
    }

    pub fn scaled(self, factor: i64) -> Self {
        Self {
            blessing: self.blessing.saturating_mul(factor),
            favor: self.favor.saturating_mul(factor),
        }
    }

    pub fn is_zero(self) -> bool {
        self == Self::ZERO
    }

    /// Positive components only.
    pub fn spent(self) -> Self {
        Self {
            blessing: self.blessing.max(0),
            favor: self.favor.max(0),
        }
    }

    /// Magnitude of the negative components.
    pub fn refunded(self) -> Self {
        Self {
            blessing: self.blessing.saturating_neg().max(0),
            favor: self.favor.saturating_neg().max(0),
        }
    }
}

impl Add for CurrencyDelta {
    type Output = CurrencyDelta;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            blessing: self.blessing.saturating_add(rhs.blessing),
            favor: self.favor.saturating_add(rhs.favor),
        }
    }
}

impl AddAssign for CurrencyDelta {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Neg for CurrencyDelta {
    type Output = CurrencyDelta;

    fn neg(self) -> Self::Output {
        Self {
            blessing: self.blessing.saturating_neg(),
            favor: self.favor.saturating_neg(),
        }
    }
}

impl Sum for CurrencyDelta {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, delta| acc + delta)
    }
}

impl fmt::Display for CurrencyDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} BP, {} FP", self.blessing, self.favor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CostParseError {
    #[error("unknown currency token `{0}`")]
    UnknownCurrency(String),
    #[error("currency {currency} in `{descriptor}` has no amount")]
    MissingAmount {
        descriptor: String,
        currency: Currency,
    },
    #[error("amount `{amount}` in `{descriptor}` is out of range")]
    AmountOutOfRange { descriptor: String, amount: String },
    #[error("`{0}` names no currency amount")]
    NoCurrency(String),
}

const FREE_WORDS: [&str; 4] = ["free", "none", "n/a", "-"];
const GRANT_STEMS: [&str; 3] = ["grant", "award", "gain"];

/// Parse a free-form signed cost descriptor such as `"Cost: 3 BP, 1 FP"`.
///
/// Only the first clause of an `X or Y` descriptor counts, and `(use N)`
/// shorthand is unwrapped before extraction. The clause is a grant when its
/// leading word is a grant verb (`grants`, `award`, `gain`); the same words
/// later in the text, as in `"Cost: 2 BP (gains access)"`, leave it a cost.
/// A currency that does not appear contributes zero.
pub fn parse_cost(descriptor: &str) -> Result<CurrencyDelta, CostParseError> {
    let trimmed = descriptor.trim();
    if trimmed.is_empty() || FREE_WORDS.contains(&trimmed.to_ascii_lowercase().as_str()) {
        return Ok(CurrencyDelta::ZERO);
    }

    let lowered = trimmed.to_ascii_lowercase();
    let clause = unwrap_use_shorthand(first_clause(&lowered));
    let tokens = tokenize(&clause);
    let is_grant = tokens
        .iter()
        .find_map(|token| match token {
            Token::Word(word) => Some(*word),
            Token::Number(_) => None,
        })
        .is_some_and(|word| GRANT_STEMS.iter().any(|stem| word.starts_with(stem)));

    let mut delta = CurrencyDelta::ZERO;
    let mut pending: Option<&str> = None;
    let mut found_currency = false;
    for token in &tokens {
        match token {
            Token::Number(raw) => pending = Some(*raw),
            Token::Word(word) => {
                let Ok(currency) = word.parse::<Currency>() else {
                    // Numbers only count when a currency token follows them.
                    pending = None;
                    continue;
                };
                let Some(raw) = pending.take() else {
                    return Err(CostParseError::MissingAmount {
                        descriptor: descriptor.to_string(),
                        currency,
                    });
                };
                let amount = raw
                    .parse::<i64>()
                    .map_err(|_| CostParseError::AmountOutOfRange {
                        descriptor: descriptor.to_string(),
                        amount: raw.to_string(),
                    })?;
                delta.add_to(currency, amount);
                found_currency = true;
            }
        }
    }

    if !found_currency {
        return Err(CostParseError::NoCurrency(descriptor.to_string()));
    }
    Ok(if is_grant { -delta } else { delta })
}

/// Lenient form of [`parse_cost`]: malformed descriptors cost nothing.
pub fn cost_or_zero(descriptor: &str) -> CurrencyDelta {
    match parse_cost(descriptor) {
        Ok(delta) => delta,
        Err(err) => {
            debug!(descriptor, %err, "malformed cost descriptor treated as zero");
            CurrencyDelta::ZERO
        }
    }
}

fn first_clause(text: &str) -> &str {
    let mut offset = 0;
    for word in text.split_inclusive(char::is_whitespace) {
        if word.trim() == "or" && offset > 0 {
            return &text[..offset];
        }
        offset += word.len();
    }
    text
}

fn unwrap_use_shorthand(text: &str) -> String {
    let mut out = text.to_string();
    while let Some(start) = out.find("(use") {
        let Some(len) = out[start..].find(')') else {
            break;
        };
        let inner = out[start + 4..start + len].trim().to_string();
        out.replace_range(start..=start + len, &format!(" {} ", inner));
    }
    out
}

#[derive(Debug, PartialEq, Eq)]
enum Token<'a> {
    Number(&'a str),
    Word(&'a str),
}

fn tokenize(text: &str) -> Vec<Token<'_>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        let signed_digit = (b == b'-' || b == b'+')
            && bytes.get(i + 1).is_some_and(u8::is_ascii_digit)
            && (i == 0 || !bytes[i - 1].is_ascii_alphanumeric());
        if b.is_ascii_digit() || signed_digit {
            let start = i;
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            let raw = &text[start..i];
            tokens.push(Token::Number(raw.strip_prefix('+').unwrap_or(raw)));
        } else if b.is_ascii_alphabetic() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
                i += 1;
            }
            tokens.push(Token::Word(&text[start..i]));
        } else {
            i += 1;
        }
    }
    tokens
}

/// Cost of one catalog item at the given count (1 for set-shaped picks).
pub fn item_cost(item: &ChoiceItem, count: u32) -> CurrencyDelta {
    let rule = item.counter.map(|spec| spec.rule).unwrap_or_default();
    cost_or_zero(&item.cost).scaled(counter_multiplier(&rule, count))
}

/// Spent and refunded currency summed over a selection state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CostTally {
    pub spent: CurrencyDelta,
    pub refunded: CurrencyDelta,
}

impl CostTally {
    pub fn net(&self) -> CurrencyDelta {
        self.spent + -self.refunded
    }

    fn record(&mut self, delta: CurrencyDelta) {
        self.spent += delta.spent();
        self.refunded += delta.refunded();
    }
}

/// Sum item deltas over every picked id in every category.
pub fn aggregate_selection(catalog: &Catalog, selections: &Selections) -> CostTally {
    let mut tally = CostTally::default();
    for (category_id, selection) in selections.iter() {
        for (item_id, count) in selection.counted() {
            let Some(item) = catalog.item_in(category_id, item_id) else {
                continue;
            };
            tally.record(item_cost(item, count));
        }
    }
    tally
}
