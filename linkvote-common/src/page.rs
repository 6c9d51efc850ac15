use std::num::NonZeroU64;

pub const PAGE_SIZE: u64 = 10;

/// A 1-based page of the newest-first post listing.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct Page(NonZeroU64);

impl Page {
    pub const FIRST: Page = Page(NonZeroU64::MIN);

    /// Clamps `number` to at least 1.
    #[must_use]
    pub fn new(number: u64) -> Self {
        NonZeroU64::new(number).map_or(Self::FIRST, Page)
    }

    /// Reads a page number from an optional query value. Anything that is not a positive
    /// integer falls back to the first page.
    #[must_use]
    pub fn from_query(value: Option<&str>) -> Self {
        value
            .and_then(|value| value.trim().parse::<i64>().ok())
            .and_then(|number| u64::try_from(number).ok())
            .map_or(Self::FIRST, Self::new)
    }

    #[must_use]
    pub fn number(self) -> u64 {
        self.0.get()
    }

    #[must_use]
    pub fn offset(self) -> u64 {
        (self.number() - 1).saturating_mul(PAGE_SIZE)
    }

    #[must_use]
    pub fn limit(self) -> u64 {
        PAGE_SIZE
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::FIRST
    }
}
