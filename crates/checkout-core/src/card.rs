//! Card Reconciliation
//!
//! Decides which card actually gets charged when a checkout form comes back.
//!
//! The checkout form never shows a stored number in full: it pre-fills the
//! masked form (`************8888`). Callers must keep that contract, since a
//! submission whose last four characters still match the stored number is
//! read as "number unchanged".
//!
//! ```text
//!   stored (vault)          submitted (form)
//!   5555666677778888  ───┐  ************8888
//!   05/2026              │  06/2027
//!                        ▼
//!              ┌───────────────────┐
//!              │    reconcile()    │  number and expiry decided
//!              └───────────────────┘  independently
//!                        │
//!                        ▼
//!   effective: 5555666677778888  06/2027
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Stored numbers this short are leftovers, not a card on file.
pub const DEGENERATE_NUMBER_LEN: usize = 4;

/// Longest card number accepted (ISO/IEC 7812 PAN length)
pub const MAX_NUMBER_LEN: usize = 19;

/// Card expiry (month/year)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Expiry {
    pub month: u32,
    pub year: i32,
}

impl Expiry {
    pub fn new(month: u32, year: i32) -> Self {
        Self { month, year }
    }

    /// True for a calendar month (1-12) in a positive year
    pub fn is_well_formed(&self) -> bool {
        (1..=12).contains(&self.month) && self.year >= 1
    }
}

impl std::fmt::Display for Expiry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}/{}", self.month, self.year)
    }
}

/// The single card kept on file for an owner
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCard {
    /// Username the card belongs to
    pub owner: String,

    /// Full card number, empty when nothing is on file
    #[serde(default)]
    pub number: String,

    /// Expiry, zeroed when nothing is on file
    #[serde(default)]
    pub expiry: Expiry,
}

impl StoredCard {
    /// The "no card on file" sentinel
    pub fn empty(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            number: String::new(),
            expiry: Expiry::default(),
        }
    }

    pub fn new(owner: impl Into<String>, number: impl Into<String>, expiry: Expiry) -> Self {
        Self {
            owner: owner.into(),
            number: number.into(),
            expiry,
        }
    }

    /// Whether a usable number is on file
    pub fn is_on_file(&self) -> bool {
        self.number.chars().count() > DEGENERATE_NUMBER_LEN
    }

    /// Number as the checkout form may show it
    pub fn masked_number(&self) -> String {
        mask_number(&self.number)
    }
}

/// Card fields exactly as they came back on the form
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedCardInput {
    /// Full number, or the masked echo of the stored one
    pub number_field: String,
    pub expiry_month: u32,
    pub expiry_year: i32,
}

impl SubmittedCardInput {
    pub fn new(number_field: impl Into<String>, expiry_month: u32, expiry_year: i32) -> Self {
        Self {
            number_field: number_field.into(),
            expiry_month,
            expiry_year,
        }
    }

    pub fn expiry(&self) -> Expiry {
        Expiry::new(self.expiry_month, self.expiry_year)
    }
}

/// Card that gets validated, charged and optionally remembered
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveCard {
    pub number: String,
    pub expiry: Expiry,
}

// Keeps full numbers out of `{:?}` log output.
impl std::fmt::Debug for EffectiveCard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectiveCard")
            .field("number", &mask_number(&self.number))
            .field("expiry", &self.expiry)
            .finish()
    }
}

impl EffectiveCard {
    pub fn new(number: impl Into<String>, expiry: Expiry) -> Self {
        Self {
            number: number.into(),
            expiry,
        }
    }

    /// Format check before any charge attempt.
    ///
    /// Expiry in the past is the authorizer's call, not ours.
    pub fn validate(&self) -> std::result::Result<(), CardRejection> {
        let len = self.number.chars().count();
        if len <= DEGENERATE_NUMBER_LEN {
            return Err(CardRejection::TooShort);
        }
        if len > MAX_NUMBER_LEN {
            return Err(CardRejection::TooLong);
        }
        if !self.number.chars().all(|c| c.is_ascii_digit()) {
            return Err(CardRejection::NonDigit);
        }
        if !self.expiry.is_well_formed() {
            return Err(CardRejection::BadExpiry);
        }
        Ok(())
    }

    pub fn last_four(&self) -> &str {
        last_four(&self.number)
    }

    /// Short stable fingerprint safe to log
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.number)
    }
}

/// Why a card failed format validation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CardRejection {
    TooShort,
    TooLong,
    NonDigit,
    BadExpiry,
}

impl CardRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardRejection::TooShort => "too_short",
            CardRejection::TooLong => "too_long",
            CardRejection::NonDigit => "non_digit",
            CardRejection::BadExpiry => "bad_expiry",
        }
    }
}

/// What reconciliation decided for each field
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reconciliation {
    /// Nothing usable was on file; everything came from the form
    pub new_card: bool,
    pub number_changed: bool,
    pub expiry_changed: bool,
}

/// Merge the stored card with what the shopper submitted.
///
/// Precondition: the form showed at most the last four digits of
/// `stored.number`.
pub fn reconcile(stored: &StoredCard, submitted: &SubmittedCardInput) -> (EffectiveCard, Reconciliation) {
    if !stored.is_on_file() {
        let card = EffectiveCard::new(submitted.number_field.clone(), submitted.expiry());
        let decision = Reconciliation {
            new_card: true,
            number_changed: true,
            expiry_changed: true,
        };
        return (card, decision);
    }

    let number_changed = last_four(&submitted.number_field) != last_four(&stored.number);
    let number = if number_changed {
        submitted.number_field.clone()
    } else {
        stored.number.clone()
    };

    let expiry_changed = submitted.expiry() != stored.expiry;
    let expiry = if expiry_changed {
        submitted.expiry()
    } else {
        stored.expiry
    };

    let decision = Reconciliation {
        new_card: false,
        number_changed,
        expiry_changed,
    };
    (EffectiveCard::new(number, expiry), decision)
}

/// Last four characters, or the whole string when shorter
pub fn last_four(number: &str) -> &str {
    number
        .char_indices()
        .rev()
        .nth(3)
        .map_or(number, |(idx, _)| &number[idx..])
}

/// Replace everything but the last four characters with `*`
pub fn mask_number(number: &str) -> String {
    let tail = last_four(number);
    let hidden = number.chars().count() - tail.chars().count();
    let mut masked = "*".repeat(hidden);
    masked.push_str(tail);
    masked
}

fn fingerprint(number: &str) -> String {
    let digest = Sha256::digest(number.as_bytes());
    hex::encode(&digest[..6])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn stored_b() -> StoredCard {
        StoredCard::new("alice", "5555666677778888", Expiry::new(5, 2026))
    }

    #[test]
    fn test_scenario_a_empty_vault_takes_submission() {
        let stored = StoredCard::empty("alice");
        let submitted = SubmittedCardInput::new("4111111111111111", 12, 2030);

        let (card, decision) = reconcile(&stored, &submitted);
        assert_eq!(card.number, "4111111111111111");
        assert_eq!(card.expiry, Expiry::new(12, 2030));
        assert!(decision.new_card);
    }

    #[test]
    fn test_scenario_b_nothing_changed() {
        let submitted = SubmittedCardInput::new("123456778888", 5, 2026);

        let (card, decision) = reconcile(&stored_b(), &submitted);
        assert_eq!(card.number, "5555666677778888");
        assert_eq!(card.expiry, Expiry::new(5, 2026));
        assert!(!decision.number_changed);
        assert!(!decision.expiry_changed);
    }

    #[test]
    fn test_scenario_c_new_number_same_expiry() {
        let submitted = SubmittedCardInput::new("4000123412349999", 5, 2026);

        let (card, _) = reconcile(&stored_b(), &submitted);
        assert_eq!(card.number, "4000123412349999");
        assert_eq!(card.expiry, Expiry::new(5, 2026));
    }

    #[test]
    fn test_scenario_d_same_number_new_expiry() {
        let submitted = SubmittedCardInput::new("************8888", 6, 2027);

        let (card, decision) = reconcile(&stored_b(), &submitted);
        assert_eq!(card.number, "5555666677778888");
        assert_eq!(card.expiry, Expiry::new(6, 2027));
        assert!(!decision.number_changed);
        assert!(decision.expiry_changed);
    }

    #[test]
    fn test_only_year_changed_counts_as_expiry_change() {
        let submitted = SubmittedCardInput::new("8888", 5, 2028);

        let (card, _) = reconcile(&stored_b(), &submitted);
        assert_eq!(card.number, "5555666677778888");
        assert_eq!(card.expiry, Expiry::new(5, 2028));
    }

    #[test]
    fn test_short_submission_is_a_new_number() {
        let submitted = SubmittedCardInput::new("888", 5, 2026);

        let (card, decision) = reconcile(&stored_b(), &submitted);
        assert!(decision.number_changed);
        assert_eq!(card.number, "888");
        assert_eq!(card.validate(), Err(CardRejection::TooShort));
    }

    #[test]
    fn test_mask_number() {
        assert_eq!(mask_number("5555666677778888"), "************8888");
        assert_eq!(mask_number("123"), "123");
        assert_eq!(mask_number(""), "");
    }

    #[test]
    fn test_validate() {
        let ok = EffectiveCard::new("4111111111111111", Expiry::new(12, 2030));
        assert!(ok.validate().is_ok());

        let masked = EffectiveCard::new("************1111", Expiry::new(12, 2030));
        assert_eq!(masked.validate(), Err(CardRejection::NonDigit));

        let bad_month = EffectiveCard::new("4111111111111111", Expiry::new(13, 2030));
        assert_eq!(bad_month.validate(), Err(CardRejection::BadExpiry));

        let long = EffectiveCard::new("4".repeat(20), Expiry::new(1, 2030));
        assert_eq!(long.validate(), Err(CardRejection::TooLong));
    }

    #[test]
    fn test_debug_hides_number() {
        let card = EffectiveCard::new("4111111111111111", Expiry::new(12, 2030));
        let rendered = format!("{card:?}");
        assert!(!rendered.contains("4111111111111111"));
        assert!(rendered.contains("1111"));
        assert_eq!(card.fingerprint().len(), 12);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn degenerate_stored_number_takes_submission(
            stored_number in "[0-9*]{0,4}",
            stored_month in 0u32..13,
            field in "[0-9*]{0,19}",
            month in 1u32..13,
            year in 2000i32..2100,
        ) {
            let stored = StoredCard::new("bob", stored_number, Expiry::new(stored_month, 2025));
            let submitted = SubmittedCardInput::new(field.clone(), month, year);

            let (card, _) = reconcile(&stored, &submitted);
            prop_assert_eq!(card.number, field);
            prop_assert_eq!(card.expiry, Expiry::new(month, year));
        }

        #[test]
        fn matching_last_four_keeps_stored_number(
            stored_head in "[0-9]{1,15}",
            tail in "[0-9]{4}",
            prefix in "[0-9*]{0,12}",
        ) {
            let stored_number = format!("{stored_head}{tail}");
            let stored = StoredCard::new("bob", stored_number.clone(), Expiry::new(3, 2029));
            let submitted = SubmittedCardInput::new(format!("{prefix}{tail}"), 3, 2029);

            let (card, _) = reconcile(&stored, &submitted);
            prop_assert_eq!(card.number, stored_number);
        }

        #[test]
        fn differing_last_four_takes_submitted_number(
            stored_head in "[0-9]{1,15}",
            stored_tail in "[0-9]{4}",
            field in "[0-9]{5,19}",
        ) {
            prop_assume!(last_four(&field) != stored_tail);
            let stored = StoredCard::new("bob", format!("{stored_head}{stored_tail}"), Expiry::new(3, 2029));
            let submitted = SubmittedCardInput::new(field.clone(), 3, 2029);

            let (card, _) = reconcile(&stored, &submitted);
            prop_assert_eq!(card.number, field);
        }

        #[test]
        fn number_and_expiry_are_decided_independently(
            change_number in any::<bool>(),
            change_expiry in any::<bool>(),
        ) {
            let stored = stored_b();
            let field = if change_number { "4000123412349999" } else { "************8888" };
            let (month, year) = if change_expiry { (6, 2027) } else { (5, 2026) };
            let submitted = SubmittedCardInput::new(field, month, year);

            let (card, decision) = reconcile(&stored, &submitted);
            prop_assert_eq!(decision.number_changed, change_number);
            prop_assert_eq!(decision.expiry_changed, change_expiry);

            let expected_number = if change_number { field } else { stored.number.as_str() };
            let expected_expiry = if change_expiry { Expiry::new(6, 2027) } else { stored.expiry };
            prop_assert_eq!(card.number.as_str(), expected_number);
            prop_assert_eq!(card.expiry, expected_expiry);
        }
    }
}
