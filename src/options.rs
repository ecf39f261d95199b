use std::collections::BTreeSet;
use std::str::FromStr;

use crate::error::ExtractError;

pub const DEFAULT_DPI: u32 = 200;
pub const MIN_DPI: u32 = 36;
pub const MAX_DPI: u32 = 1200;

/// 1-based set of pages to process, parsed from `1-3,5`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSelection {
    pages: BTreeSet<u32>,
}

impl PageSelection {
    #[must_use]
    pub fn contains(&self, page: u32) -> bool {
        self.pages.contains(&page)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    #[must_use]
    pub fn last(&self) -> Option<u32> {
        self.pages.last().copied()
    }
}

fn page_number(text: &str) -> Result<u32, String> {
    match text.trim().parse::<u32>() {
        Ok(0) => Err("pages are 1-based".to_string()),
        Ok(page) => Ok(page),
        Err(_) => Err(format!("invalid page number: '{}'", text.trim())),
    }
}

impl FromStr for PageSelection {
    type Err = String;

    /// Comma-separated pages and inclusive ranges, e.g. `1-3,5`.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut pages = BTreeSet::new();
        for token in text.split(',').map(str::trim).filter(|token| !token.is_empty()) {
            let (first, last) = match token.split_once('-') {
                Some((first, last)) => (page_number(first)?, page_number(last)?),
                None => {
                    let page = page_number(token)?;
                    (page, page)
                }
            };
            if last < first {
                return Err(format!("invalid range '{token}': end is smaller than start"));
            }
            pages.extend(first..=last);
        }

        if pages.is_empty() {
            return Err("page selection cannot be empty".to_string());
        }
        Ok(Self { pages })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractOptions {
    pub pages: Option<PageSelection>,
    pub dpi: u32,
    pub debug: bool,
}

impl ExtractOptions {
    pub fn validate(&self) -> Result<(), ExtractError> {
        if !(MIN_DPI..=MAX_DPI).contains(&self.dpi) {
            return Err(ExtractError::InvalidOption(format!(
                "dpi must be between {MIN_DPI} and {MAX_DPI}, got {}",
                self.dpi
            )));
        }
        Ok(())
    }

    /// 0-based indices of the selected pages in a document of `count` pages.
    pub fn resolve_pages(&self, count: u32) -> Result<Vec<u32>, ExtractError> {
        if let Some(last) = self.pages.as_ref().and_then(PageSelection::last)
            && last > count
        {
            return Err(ExtractError::PageOutOfRange { page: last, count });
        }

        let pages = (0..count)
            .filter(|index| self.wants_page(index + 1))
            .collect::<Vec<_>>();
        if pages.is_empty() {
            return Err(ExtractError::NoPagesSelected);
        }
        Ok(pages)
    }

    /// Whether the 1-based `page` should be processed.
    #[must_use]
    pub fn wants_page(&self, page: u32) -> bool {
        self.pages
            .as_ref()
            .is_none_or(|selection| selection.contains(page))
    }
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            pages: None,
            dpi: DEFAULT_DPI,
            debug: false,
        }
    }
}
