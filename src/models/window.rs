use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

/// Inclusive time range over local capture timestamps.
///
/// An absent end is open-ended: it resolves to "now" each time the window
/// is evaluated, so the caller supplies the clock reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    start: NaiveDateTime,
    end: Option<NaiveDateTime>,
}

impl FetchWindow {
    pub fn new(start: NaiveDateTime, end: Option<NaiveDateTime>) -> Result<Self, WindowError> {
        if let Some(end) = end {
            if start > end {
                return Err(WindowError::Inverted { start, end });
            }
        }
        Ok(Self { start, end })
    }

    /// Build a window from caller-supplied strings.
    ///
    /// A date-only end (`2024-01-31`) covers that whole day.
    pub fn parse(start: &str, end: Option<&str>) -> Result<Self, WindowError> {
        let start = parse_local_timestamp(start)
            .ok_or_else(|| WindowError::InvalidTimestamp(start.to_string()))?;

        let end = match end.map(str::trim).filter(|raw| !raw.is_empty()) {
            Some(raw) => Some(
                parse_end_bound(raw).ok_or_else(|| WindowError::InvalidTimestamp(raw.to_string()))?,
            ),
            None => None,
        };

        Self::new(start, end)
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> Option<NaiveDateTime> {
        self.end
    }

    pub fn effective_end(&self, now: NaiveDateTime) -> NaiveDateTime {
        self.end.unwrap_or(now)
    }

    pub fn contains(&self, captured: NaiveDateTime, now: NaiveDateTime) -> bool {
        self.start <= captured && captured <= self.effective_end(now)
    }

    /// Value for the remote `after` query parameter.
    pub fn after_param(&self) -> String {
        self.start.format(PARAM_FORMAT).to_string()
    }

    /// Value for the remote `before` query parameter, only when bounded.
    pub fn before_param(&self) -> Option<String> {
        self.end.map(|end| end.format(PARAM_FORMAT).to_string())
    }
}

const PARAM_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, thiserror::Error)]
pub enum WindowError {
    #[error("Unparseable timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Window start {start} is after end {end}")]
    Inverted {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
}

/// Parse a capture timestamp as local wall-clock time.
///
/// Offsets are dropped, not applied: PhotoPrism's `TakenAtLocal` carries a
/// `Z` suffix even though the value is the camera's local time.
pub fn parse_local_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.naive_local());
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed);
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|date| date.and_time(NaiveTime::MIN))
}

fn parse_end_bound(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(date) = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
        return date.and_hms_milli_opt(23, 59, 59, 999);
    }
    parse_local_timestamp(raw)
}

/// Offset cursor for sequential paging through the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    offset: usize,
    page_size: usize,
    max_records: usize,
}

impl PageCursor {
    pub fn new(page_size: usize, max_records: usize) -> Self {
        Self {
            offset: 0,
            page_size,
            max_records,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Offset to send; the first page omits the parameter.
    pub fn query_offset(&self) -> Option<usize> {
        (self.offset > 0).then_some(self.offset)
    }

    pub fn is_exhausted(&self) -> bool {
        self.offset >= self.max_records
    }

    pub fn advance(&mut self) {
        self.offset += self.page_size;
    }

    /// Upper bound on the number of pages this cursor will ever request.
    pub fn max_pages(&self) -> usize {
        self.max_records.div_ceil(self.page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(raw: &str) -> NaiveDateTime {
        parse_local_timestamp(raw).unwrap()
    }

    #[test]
    fn test_parse_keeps_wall_clock_of_zulu_timestamps() {
        assert_eq!(at("2024-01-15T10:30:00Z"), at("2024-01-15 10:30:00"));
        assert_eq!(at("2024-01-15T10:30:00+05:00"), at("2024-01-15T10:30:00"));
    }

    #[test]
    fn test_parse_date_only_is_midnight() {
        assert_eq!(at("2024-01-01"), at("2024-01-01T00:00:00"));
        assert!(parse_local_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_date_only_end_covers_whole_day() {
        let window = FetchWindow::parse("2024-01-01", Some("2024-01-31")).unwrap();
        let now = at("2030-01-01T00:00:00");

        assert!(window.contains(at("2024-01-01T00:00:00"), now));
        assert!(window.contains(at("2024-01-31T23:59:59"), now));
        assert!(!window.contains(at("2024-02-01T00:00:00"), now));
        assert!(!window.contains(at("2023-12-31T23:59:59"), now));
    }

    #[test]
    fn test_open_end_uses_now() {
        let window = FetchWindow::parse("2024-01-01", None).unwrap();
        let now = at("2024-06-01T12:00:00");

        assert!(window.contains(now, now));
        assert!(!window.contains(at("2024-06-01T12:00:01"), now));
        assert_eq!(window.before_param(), None);
    }

    #[test]
    fn test_blank_end_is_open() {
        let window = FetchWindow::parse("2024-01-01", Some("  ")).unwrap();
        assert_eq!(window.end(), None);
    }

    #[test]
    fn test_inverted_window_rejected() {
        let err = FetchWindow::parse("2024-02-01", Some("2024-01-01")).unwrap_err();
        assert!(matches!(err, WindowError::Inverted { .. }));
    }

    #[test]
    fn test_query_params() {
        let window = FetchWindow::parse("2024-01-01", Some("2024-01-31T18:00:00")).unwrap();
        assert_eq!(window.after_param(), "2024-01-01T00:00:00");
        assert_eq!(window.before_param().as_deref(), Some("2024-01-31T18:00:00"));
    }

    #[test]
    fn test_cursor_omits_first_offset() {
        let mut cursor = PageCursor::new(1000, 1_000_000);
        assert_eq!(cursor.query_offset(), None);
        cursor.advance();
        assert_eq!(cursor.query_offset(), Some(1000));
        assert_eq!(cursor.max_pages(), 1000);
    }

    #[test]
    fn test_cursor_exhausts_at_cap() {
        let mut cursor = PageCursor::new(1000, 2500);
        let mut pages = 0;
        while !cursor.is_exhausted() {
            pages += 1;
            cursor.advance();
        }
        assert_eq!(pages, 3);
        assert_eq!(pages, cursor.max_pages());
    }
}
