//! Structural and semantic rules for SAR documents.
//!
//! Rules are plain functions over a [`RuleContext`] and run in the order of
//! [`RULES`]; their outputs are concatenated, so finding order is stable:
//!
//! 1. `structural_presence`: required blocks and collections
//! 2. `required_fields`: missing elements versus placeholder values
//! 3. `filing_semantics`: filing date format and future-date warning
//! 4. `transaction_semantics`: date, amount, currency and UETR per transaction
//! 5. `duplicate_identifiers`: UETR reuse across transactions
//!
//! A root element with the wrong name short-circuits everything else.
//!
//! Tie-break between "missing" and "placeholder": an element that is absent
//! gets a structural finding; an element that is present but empty or holds
//! a placeholder gets the placeholder finding and is skipped by the format
//! checks.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use once_cell::unsync::OnceCell;
use regex::Regex;
use rust_decimal::Decimal;

use crate::document::{NodeId, ParsedTree};
use crate::location::{ParentIndex, attribute_location};
use crate::validator::{ErrorKind, ValidationError};

pub const DEFAULT_ROOT_TAG: &str = "SAR";

/// Values treated as "not provided", compared after trimming and upper-casing.
pub const PLACEHOLDER_VALUES: [&str; 7] = [
    "",
    "UNKNOWN",
    "PENDING",
    "TBD",
    "N/A",
    "NA",
    "NOT APPLICABLE",
];

/// Maximum number of fractional digits an amount may carry
pub const MAX_FRACTION_DIGITS: u32 = 2;

pub const CURRENCY_ATTRIBUTE: &str = "currency";

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$").expect("valid date pattern"));

/// Plain base-10 literal: optional sign, digits, optional fraction. No exponent.
static DECIMAL_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(?:[0-9]+\.?[0-9]*|\.[0-9]+)$").expect("valid decimal pattern")
});

static CURRENCY_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{3}$").expect("valid currency pattern"));

static UETR_COMPACT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9A-Fa-f]{32}$").expect("valid UETR pattern"));

static UETR_HYPHENATED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[0-9A-Fa-f]{8}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{12}$",
    )
    .expect("valid UETR pattern")
});

/// Top-level blocks that must appear exactly under the root
const REQUIRED_BLOCKS: [&str; 2] = ["FilingInformation", "FilerInformation"];

/// (container, entry) pairs that need at least one entry
const REQUIRED_COLLECTIONS: [(&str, &str); 2] =
    [("Subjects", "Subject"), ("Transactions", "Transaction")];

struct FieldRule {
    tag: &'static str,
    required: bool,
}

const fn required(tag: &'static str) -> FieldRule {
    FieldRule { tag, required: true }
}

const fn optional(tag: &'static str) -> FieldRule {
    FieldRule {
        tag,
        required: false,
    }
}

const FILING_FIELDS: [FieldRule; 3] = [
    required("FilingType"),
    required("FilingDate"),
    optional("AmendmentType"),
];

const FILER_FIELDS: [FieldRule; 2] = [required("FilerName"), optional("TIN")];

const FILER_ADDRESS_FIELDS: [FieldRule; 5] = [
    optional("AddressLine1"),
    optional("City"),
    optional("State"),
    optional("ZIP"),
    optional("Country"),
];

const SUBJECT_FIELDS: [FieldRule; 2] = [required("Name"), optional("EntityType")];

const TRANSACTION_FIELDS: [FieldRule; 3] =
    [required("Date"), required("Amount"), required("UETR")];

const ORIGINATING_ACCOUNT_FIELDS: [FieldRule; 1] = [optional("Name")];

const BENEFICIARY: FieldRule = optional("Beneficiary");

/// A rule inspects the whole tree and reports its findings in document order.
pub type Rule = fn(&RuleContext<'_>) -> Vec<ValidationError>;

pub struct NamedRule {
    pub name: &'static str,
    pub check: Rule,
}

/// Evaluation order of the rule engine
pub const RULES: [NamedRule; 5] = [
    NamedRule {
        name: "structural_presence",
        check: structural_presence as Rule,
    },
    NamedRule {
        name: "required_fields",
        check: required_fields as Rule,
    },
    NamedRule {
        name: "filing_semantics",
        check: filing_semantics as Rule,
    },
    NamedRule {
        name: "transaction_semantics",
        check: transaction_semantics as Rule,
    },
    NamedRule {
        name: "duplicate_identifiers",
        check: duplicate_identifiers as Rule,
    },
];

/// Everything a rule may look at for one validation call
pub struct RuleContext<'a> {
    tree: &'a ParsedTree,
    today: NaiveDate,
    currency_allow_list: Option<&'a BTreeSet<String>>,
    root_tag: &'a str,
    parents: OnceCell<ParentIndex>,
}

impl<'a> RuleContext<'a> {
    pub fn new(
        tree: &'a ParsedTree,
        today: NaiveDate,
        currency_allow_list: Option<&'a BTreeSet<String>>,
        root_tag: &'a str,
    ) -> Self {
        Self {
            tree,
            today,
            currency_allow_list,
            root_tag,
            parents: OnceCell::new(),
        }
    }

    pub fn tree(&self) -> &'a ParsedTree {
        self.tree
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Location of `node`; the parent index is built on first use.
    pub fn locate(&self, node: NodeId) -> String {
        self.parents
            .get_or_init(|| ParentIndex::build(self.tree))
            .locate(self.tree, node)
    }

    fn root_matches(&self) -> bool {
        self.tree.tag(self.tree.root()) == self.root_tag
    }

    fn entries(&self, container: &str, entry: &str) -> Vec<NodeId> {
        self.tree
            .child(self.tree.root(), container)
            .map(|node| self.tree.children_named(node, entry).collect())
            .unwrap_or_default()
    }

    fn subjects(&self) -> Vec<NodeId> {
        self.entries("Subjects", "Subject")
    }

    fn transactions(&self) -> Vec<NodeId> {
        self.entries("Transactions", "Transaction")
    }

    fn value_of(&self, node: NodeId) -> FieldValue<'a> {
        classify(self.tree.element(node).text())
    }
}

/// Run every rule in order.
pub fn evaluate(context: &RuleContext<'_>) -> Vec<ValidationError> {
    if !context.root_matches() {
        let root = context.tree().root();
        return vec![ValidationError::error(
            ErrorKind::Structural,
            format!("Root element must be <{}>.", context.root_tag),
            Some(context.locate(root)),
        )];
    }

    RULES
        .iter()
        .flat_map(|rule| (rule.check)(context))
        .collect()
}

enum FieldValue<'t> {
    Placeholder(&'t str),
    Present(&'t str),
}

fn classify(text: Option<&str>) -> FieldValue<'_> {
    let value = text.map(str::trim).unwrap_or("");
    if is_placeholder(value) {
        FieldValue::Placeholder(value)
    } else {
        FieldValue::Present(value)
    }
}

/// Whether a value is semantically "not provided".
pub fn is_placeholder(value: &str) -> bool {
    PLACEHOLDER_VALUES.contains(&value.trim().to_uppercase().as_str())
}

/// 32 hex characters, or the same grouped 8-4-4-4-12 with hyphens.
pub fn is_valid_uetr(value: &str) -> bool {
    UETR_COMPACT.is_match(value) || UETR_HYPHENATED.is_match(value)
}

/// Comparison key for duplicate detection: case-insensitive, and the two
/// accepted UETR spellings of the same identifier compare equal.
pub fn identifier_key(value: &str) -> String {
    let lowered = value.trim().to_lowercase();
    if is_valid_uetr(&lowered) {
        lowered.replace('-', "")
    } else {
        lowered
    }
}

/// Strict `YYYY-MM-DD`.
pub fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    if !ISO_DATE.is_match(value) {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

fn structural_presence(context: &RuleContext<'_>) -> Vec<ValidationError> {
    let tree = context.tree();
    let root = tree.root();
    let mut errors = Vec::new();

    for block in REQUIRED_BLOCKS {
        if tree.child(root, block).is_none() {
            errors.push(ValidationError::error(
                ErrorKind::Structural,
                format!("Missing <{}> block.", block),
                Some(context.locate(root)),
            ));
        }
    }

    for (container, entry) in REQUIRED_COLLECTIONS {
        let missing_at = match tree.child(root, container) {
            None => Some(root),
            Some(node) if tree.child(node, entry).is_none() => Some(node),
            Some(_) => None,
        };
        if let Some(node) = missing_at {
            errors.push(ValidationError::error(
                ErrorKind::Structural,
                format!("At least one <{}> is required.", entry),
                Some(context.locate(node)),
            ));
        }
    }

    errors
}

fn required_fields(context: &RuleContext<'_>) -> Vec<ValidationError> {
    let tree = context.tree();
    let root = tree.root();
    let mut errors = Vec::new();

    if let Some(filing) = tree.child(root, "FilingInformation") {
        check_fields(context, filing, &FILING_FIELDS, &mut errors);
    }

    if let Some(filer) = tree.child(root, "FilerInformation") {
        check_fields(context, filer, &FILER_FIELDS, &mut errors);
        if let Some(address) = tree.child(filer, "FilerAddress") {
            check_fields(context, address, &FILER_ADDRESS_FIELDS, &mut errors);
        }
    }

    for subject in context.subjects() {
        check_fields(context, subject, &SUBJECT_FIELDS, &mut errors);
    }

    for transaction in context.transactions() {
        check_fields(context, transaction, &TRANSACTION_FIELDS, &mut errors);
        if let Some(amount) = tree.child(transaction, "Amount") {
            check_currency_attribute(context, amount, &mut errors);
        }
        if let Some(account) = tree.child(transaction, "OriginatingAccount") {
            check_fields(context, account, &ORIGINATING_ACCOUNT_FIELDS, &mut errors);
        }
        if let Some(beneficiaries) = tree.child(transaction, "Beneficiaries") {
            for beneficiary in tree.children_named(beneficiaries, BENEFICIARY.tag) {
                check_value(context, beneficiary, &BENEFICIARY, &mut errors);
            }
        }
    }

    errors
}

fn check_fields(
    context: &RuleContext<'_>,
    parent: NodeId,
    fields: &[FieldRule],
    errors: &mut Vec<ValidationError>,
) {
    for field in fields {
        match context.tree().child(parent, field.tag) {
            None if field.required => errors.push(ValidationError::error(
                ErrorKind::Structural,
                format!("Missing <{}> element.", field.tag),
                Some(context.locate(parent)),
            )),
            None => {}
            Some(node) => check_value(context, node, field, errors),
        }
    }
}

fn check_value(
    context: &RuleContext<'_>,
    node: NodeId,
    field: &FieldRule,
    errors: &mut Vec<ValidationError>,
) {
    if let FieldValue::Placeholder(value) = context.value_of(node) {
        let message = placeholder_message(&format!("<{}>", field.tag), value);
        let location = Some(context.locate(node));
        // An optional field left as a placeholder is as good as absent.
        errors.push(if field.required {
            ValidationError::error(ErrorKind::Placeholder, message, location)
        } else {
            ValidationError::warning(ErrorKind::Placeholder, message, location)
        });
    }
}

fn check_currency_attribute(
    context: &RuleContext<'_>,
    amount: NodeId,
    errors: &mut Vec<ValidationError>,
) {
    match context.tree().element(amount).attribute(CURRENCY_ATTRIBUTE) {
        None => errors.push(ValidationError::error(
            ErrorKind::Structural,
            "Amount element missing currency attribute.",
            Some(attribute_location(
                &context.locate(amount),
                CURRENCY_ATTRIBUTE,
            )),
        )),
        Some(value) if is_placeholder(value) => errors.push(ValidationError::error(
            ErrorKind::Placeholder,
            placeholder_message("Amount currency attribute", value.trim()),
            Some(attribute_location(
                &context.locate(amount),
                CURRENCY_ATTRIBUTE,
            )),
        )),
        Some(_) => {}
    }
}

fn placeholder_message(subject: &str, value: &str) -> String {
    if value.is_empty() {
        format!("{} cannot be empty.", subject)
    } else {
        format!("{} contains placeholder value '{}'.", subject, value)
    }
}

fn filing_semantics(context: &RuleContext<'_>) -> Vec<ValidationError> {
    let tree = context.tree();
    tree.child(tree.root(), "FilingInformation")
        .and_then(|filing| tree.child(filing, "FilingDate"))
        .map(|date| check_date(context, date, "FilingDate"))
        .unwrap_or_default()
}

fn transaction_semantics(context: &RuleContext<'_>) -> Vec<ValidationError> {
    let tree = context.tree();
    let mut errors = Vec::new();

    for transaction in context.transactions() {
        if let Some(date) = tree.child(transaction, "Date") {
            errors.extend(check_date(context, date, "Transaction date"));
        }
        if let Some(amount) = tree.child(transaction, "Amount") {
            errors.extend(check_amount(context, amount));
            errors.extend(check_currency(context, amount));
        }
        if let Some(uetr) = tree.child(transaction, "UETR") {
            errors.extend(check_uetr(context, uetr));
        }
    }

    errors
}

fn check_date(context: &RuleContext<'_>, node: NodeId, label: &str) -> Vec<ValidationError> {
    let FieldValue::Present(text) = context.value_of(node) else {
        return Vec::new();
    };

    match parse_iso_date(text) {
        None => vec![ValidationError::error(
            ErrorKind::Format,
            format!("{} '{}' must be a valid date in YYYY-MM-DD format.", label, text),
            Some(context.locate(node)),
        )],
        Some(date) if date > context.today() => vec![ValidationError::warning(
            ErrorKind::Format,
            format!(
                "{} {} occurs in the future relative to today ({}).",
                label,
                text,
                context.today().format("%Y-%m-%d")
            ),
            Some(context.locate(node)),
        )],
        Some(_) => Vec::new(),
    }
}

fn check_amount(context: &RuleContext<'_>, node: NodeId) -> Vec<ValidationError> {
    let FieldValue::Present(text) = context.value_of(node) else {
        return Vec::new();
    };

    if !DECIMAL_LITERAL.is_match(text) {
        return vec![ValidationError::error(
            ErrorKind::Format,
            format!("Transaction amount '{}' must be a valid decimal number.", text),
            Some(context.locate(node)),
        )];
    }

    let mut errors = Vec::new();
    if is_negative_amount(text) {
        errors.push(ValidationError::error(
            ErrorKind::Format,
            format!("Transaction amount '{}' must not be negative.", text),
            Some(context.locate(node)),
        ));
    }
    // Written digits count, so "10.100" carries three.
    if fraction_digits(text) > MAX_FRACTION_DIGITS as usize {
        errors.push(ValidationError::error(
            ErrorKind::Format,
            format!(
                "Transaction amount '{}' must not have more than {} decimal places.",
                text, MAX_FRACTION_DIGITS
            ),
            Some(context.locate(node)),
        ));
    }
    errors
}

/// Sign of a literal already matched by `DECIMAL_LITERAL`. Values outside
/// `Decimal`'s range fall back to reading the sign and digits directly.
fn is_negative_amount(text: &str) -> bool {
    match Decimal::from_str_exact(text) {
        Ok(value) => value < Decimal::ZERO,
        Err(_) => text.starts_with('-') && text.bytes().any(|b| matches!(b, b'1'..=b'9')),
    }
}

fn fraction_digits(text: &str) -> usize {
    text.split_once('.')
        .map(|(_, fraction)| fraction.len())
        .unwrap_or(0)
}

fn check_currency(context: &RuleContext<'_>, amount: NodeId) -> Vec<ValidationError> {
    let Some(code) = context.tree().element(amount).attribute(CURRENCY_ATTRIBUTE) else {
        return Vec::new();
    };
    if is_placeholder(code) {
        return Vec::new();
    }

    let location = Some(attribute_location(
        &context.locate(amount),
        CURRENCY_ATTRIBUTE,
    ));

    if !CURRENCY_CODE.is_match(code) {
        return vec![ValidationError::error(
            ErrorKind::Format,
            format!(
                "Amount currency '{}' must be exactly three uppercase letters.",
                code
            ),
            location,
        )];
    }

    match context.currency_allow_list {
        Some(allowed) if !allowed.contains(code) => vec![ValidationError::error(
            ErrorKind::Format,
            format!("Amount currency '{}' is not an accepted currency.", code),
            location,
        )],
        _ => Vec::new(),
    }
}

fn check_uetr(context: &RuleContext<'_>, node: NodeId) -> Vec<ValidationError> {
    match context.value_of(node) {
        FieldValue::Present(text) if !is_valid_uetr(text) => vec![ValidationError::error(
            ErrorKind::Format,
            format!(
                "Transaction UETR '{}' must be a valid 32-character hex string or UUID.",
                text
            ),
            Some(context.locate(node)),
        )],
        _ => Vec::new(),
    }
}

fn duplicate_identifiers(context: &RuleContext<'_>) -> Vec<ValidationError> {
    let tree = context.tree();
    let mut first_seen: HashMap<String, usize> = HashMap::new();
    let mut errors = Vec::new();

    for (position, transaction) in context.transactions().into_iter().enumerate() {
        let index = position + 1;
        let Some(uetr) = tree.child(transaction, "UETR") else {
            continue;
        };
        let FieldValue::Present(text) = context.value_of(uetr) else {
            continue;
        };

        match first_seen.get(&identifier_key(text)) {
            Some(first) => errors.push(ValidationError::error(
                ErrorKind::Duplicate,
                format!(
                    "Transaction UETR '{}' duplicates value from Transaction[{}].",
                    text, first
                ),
                Some(context.locate(uetr)),
            )),
            None => {
                first_seen.insert(identifier_key(text), index);
            }
        }
    }

    errors
}
