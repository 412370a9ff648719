use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::LedgerError;

/// Check `[start, end)` lies within opening hours and return it as a span.
pub fn validate_span(start: SlotTime, end: SlotTime) -> Result<Span, LedgerError> {
    let span = Span::from_times(start, end).ok_or(LedgerError::InvalidSpan { start, end })?;
    if span.start < OPENING.ordinal() || span.end > CLOSING.ordinal() {
        return Err(LedgerError::InvalidSpan { start, end });
    }
    Ok(span)
}

pub(crate) fn validate_client(name: &str, phone: &str) -> Result<(), LedgerError> {
    if name.trim().is_empty() {
        return Err(LedgerError::InvalidInput("empty client name"));
    }
    if phone.trim().is_empty() {
        return Err(LedgerError::InvalidInput("empty phone"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(LedgerError::LimitExceeded("client name too long"));
    }
    if phone.len() > MAX_PHONE_LEN {
        return Err(LedgerError::LimitExceeded("phone too long"));
    }
    Ok(())
}

pub(crate) fn validate_draft(draft: &ReservationDraft) -> Result<Span, LedgerError> {
    if !is_valid_table(draft.table_id) {
        return Err(LedgerError::InvalidTable(draft.table_id));
    }
    validate_client(&draft.client_name, &draft.client_phone)?;
    validate_span(draft.start_time, draft.end_time)
}

/// Any active reservation on this table-day overlapping `span` (other than
/// `exclude`) is a conflict. Caller holds the table-day lock.
pub(crate) fn check_no_conflict(
    day: &TableDay,
    span: &Span,
    exclude: Option<Ulid>,
) -> Result<(), LedgerError> {
    match day
        .overlapping(span)
        .find(|b| Some(b.id) != exclude)
    {
        Some(existing) => Err(LedgerError::Conflict(existing.id)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn t(s: &str) -> SlotTime {
        s.parse().unwrap()
    }

    #[test]
    fn span_must_fit_opening_hours() {
        assert!(validate_span(t("12:00"), t("03:00")).is_ok());
        assert!(validate_span(t("11:00"), t("13:00")).is_err());
        assert!(validate_span(t("02:00"), t("04:00")).is_err());
        assert!(validate_span(t("21:00"), t("20:00")).is_err());
    }

    #[test]
    fn draft_validation() {
        let mut draft = ReservationDraft {
            table_id: 5,
            client_name: "Ann".into(),
            client_phone: "+7000".into(),
            booking_date: NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
            start_time: t("19:00"),
            end_time: t("21:00"),
        };
        assert!(matches!(validate_draft(&draft), Err(LedgerError::InvalidTable(5))));
        draft.table_id = 4;
        assert!(validate_draft(&draft).is_ok());
        draft.client_name = "x".repeat(MAX_NAME_LEN + 1);
        assert!(matches!(validate_draft(&draft), Err(LedgerError::LimitExceeded(_))));
        draft.client_name = "  ".into();
        assert!(matches!(validate_draft(&draft), Err(LedgerError::InvalidInput(_))));
    }

    #[test]
    fn exclude_skips_own_reservation() {
        let mut day = TableDay::new(DayKey {
            table_id: 1,
            date: NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
        });
        let own = Ulid::new();
        day.insert_booked(Booked {
            id: own,
            span: Span::from_times(t("19:00"), t("21:00")).unwrap(),
        });
        let span = Span::from_times(t("20:00"), t("22:00")).unwrap();
        assert!(matches!(check_no_conflict(&day, &span, None), Err(LedgerError::Conflict(id)) if id == own));
        assert!(check_no_conflict(&day, &span, Some(own)).is_ok());
    }
}
