use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;

/// Expense categories offered by the assistant. Each maps to exactly one
/// catalog product on the upstream side, resolved by stable code first and
/// display name second.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpenseCategory {
    Miscellaneous,
    PerDiem,
    TravelAccommodation,
}

impl ExpenseCategory {
    /// Stable internal product code used for primary catalog resolution.
    pub fn default_code(self) -> &'static str {
        match self {
            Self::Miscellaneous => "EXP_GEN",
            Self::PerDiem => "PER_DIEM",
            Self::TravelAccommodation => "TRANS & ACC",
        }
    }

    /// Catalog display name, including the bracketed code prefix the catalog
    /// carries.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Miscellaneous => "[EXP_GEN] Miscellaneous",
            Self::PerDiem => "[PER_DIEM] Per Diem",
            Self::TravelAccommodation => "[TRANS & ACC] Travel & Accommodation",
        }
    }

    /// Display name with the bracketed prefix stripped, for exact-name
    /// fallback lookups.
    pub fn bare_name(self) -> &'static str {
        match self {
            Self::Miscellaneous => "Miscellaneous",
            Self::PerDiem => "Per Diem",
            Self::TravelAccommodation => "Travel & Accommodation",
        }
    }
}

/// One 100%-weighted analytic distribution line combining the three account
/// dimensions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalyticLine {
    pub project_id: i64,
    pub market_id: i64,
    pub pool_id: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExpenseDraft {
    pub category: ExpenseCategory,
    pub amount: Option<Decimal>,
    pub currency_id: Option<i64>,
    pub date: Option<NaiveDate>,
    pub per_diem_from: Option<NaiveDate>,
    pub per_diem_to: Option<NaiveDate>,
    pub destination_id: Option<i64>,
    pub analytic: Vec<AnalyticLine>,
    pub attached_link: Option<String>,
    pub description: Option<String>,
}

impl ExpenseDraft {
    pub fn new(category: ExpenseCategory) -> Self {
        Self {
            category,
            amount: None,
            currency_id: None,
            date: None,
            per_diem_from: None,
            per_diem_to: None,
            destination_id: None,
            analytic: Vec::new(),
            attached_link: None,
            description: None,
        }
    }

    /// Required-field check per category. Analytic distribution is required
    /// for every category.
    pub fn missing_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        match self.category {
            ExpenseCategory::Miscellaneous => {
                if self.description.as_deref().unwrap_or("").trim().is_empty() {
                    missing.push("description".to_owned());
                }
                self.require_amount(&mut missing);
                if self.date.is_none() {
                    missing.push("date".to_owned());
                }
            }
            ExpenseCategory::PerDiem => {
                if self.per_diem_from.is_none() {
                    missing.push("per_diem_from".to_owned());
                }
                if self.per_diem_to.is_none() {
                    missing.push("per_diem_to".to_owned());
                }
                if self.destination_id.is_none() {
                    missing.push("destination".to_owned());
                }
            }
            ExpenseCategory::TravelAccommodation => {
                self.require_amount(&mut missing);
                if self.attached_link.as_deref().unwrap_or("").trim().is_empty() {
                    missing.push("attached_link".to_owned());
                }
            }
        }
        if self.analytic.is_empty() {
            missing.push("analytic_distribution".to_owned());
        }
        missing
    }

    fn require_amount(&self, missing: &mut Vec<String>) {
        match self.amount {
            Some(amount) if amount > Decimal::ZERO => {}
            _ => missing.push("amount".to_owned()),
        }
        if self.currency_id.is_none() {
            missing.push("currency".to_owned());
        }
    }

    /// Per-diem range as written upstream: a same-day or inverted span is
    /// corrected to a minimum one-day stay, since equal dates trip
    /// division-by-zero automation on the remote side.
    pub fn corrected_per_diem_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let from = self.per_diem_from?;
        let to = self.per_diem_to?;
        if to <= from {
            Some((from, from + Duration::days(1)))
        } else {
            Some((from, to))
        }
    }

    /// Day count for the stay, computed inclusively over the span the user
    /// supplied (a same-day stay counts as one day), minimum one day.
    pub fn days_abroad(&self) -> Option<i64> {
        let from = self.per_diem_from?;
        let to = self.per_diem_to?;
        Some(days_abroad(from, to))
    }
}

/// Inclusive day count for a per-diem span, minimum one day.
pub fn days_abroad(from: NaiveDate, to: NaiveDate) -> i64 {
    ((to - from).num_days() + 1).max(1)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::{days_abroad, AnalyticLine, ExpenseCategory, ExpenseDraft};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn analytic() -> Vec<AnalyticLine> {
        vec![AnalyticLine { project_id: 10, market_id: 20, pool_id: 30 }]
    }

    #[test]
    fn miscellaneous_requires_description_amount_currency_date() {
        let draft = ExpenseDraft::new(ExpenseCategory::Miscellaneous);
        let missing = draft.missing_fields();
        for field in ["description", "amount", "currency", "date", "analytic_distribution"] {
            assert!(missing.contains(&field.to_owned()), "missing should list {field}");
        }
    }

    #[test]
    fn zero_amount_counts_as_missing() {
        let mut draft = ExpenseDraft::new(ExpenseCategory::TravelAccommodation);
        draft.amount = Some(Decimal::ZERO);
        draft.currency_id = Some(1);
        draft.attached_link = Some("https://docs.example.com/receipt".to_owned());
        draft.analytic = analytic();
        assert_eq!(draft.missing_fields(), vec!["amount".to_owned()]);
    }

    #[test]
    fn complete_per_diem_draft_passes() {
        let mut draft = ExpenseDraft::new(ExpenseCategory::PerDiem);
        draft.per_diem_from = Some(date(2025, 9, 28));
        draft.per_diem_to = Some(date(2025, 10, 2));
        draft.destination_id = Some(55);
        draft.analytic = analytic();
        assert!(draft.missing_fields().is_empty());
    }

    #[test]
    fn same_day_per_diem_span_counts_one_day_but_writes_a_full_span() {
        let mut draft = ExpenseDraft::new(ExpenseCategory::PerDiem);
        draft.per_diem_from = Some(date(2025, 9, 28));
        draft.per_diem_to = Some(date(2025, 9, 28));
        let (from, to) = draft.corrected_per_diem_range().expect("range present");
        assert_eq!(from, date(2025, 9, 28));
        assert_eq!(to, date(2025, 9, 29));
        assert_eq!(draft.days_abroad(), Some(1));
    }

    #[test]
    fn inverted_per_diem_span_is_corrected() {
        let mut draft = ExpenseDraft::new(ExpenseCategory::PerDiem);
        draft.per_diem_from = Some(date(2025, 10, 5));
        draft.per_diem_to = Some(date(2025, 10, 1));
        let (_, to) = draft.corrected_per_diem_range().expect("range present");
        assert_eq!(to, date(2025, 10, 6));
        assert_eq!(draft.days_abroad(), Some(1));
    }

    #[test]
    fn multi_day_span_counts_inclusively() {
        assert_eq!(days_abroad(date(2025, 9, 28), date(2025, 9, 30)), 3);
    }

    #[test]
    fn category_codes_are_stable() {
        assert_eq!(ExpenseCategory::PerDiem.default_code(), "PER_DIEM");
        assert_eq!(ExpenseCategory::Miscellaneous.bare_name(), "Miscellaneous");
        assert_eq!(
            ExpenseCategory::TravelAccommodation.display_name(),
            "[TRANS & ACC] Travel & Accommodation"
        );
    }
}
