#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarningCode {
    NoGridDetected,
    NoReferenceGrid,
    UnknownClassDomain,
    UnknownCardName,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractWarning {
    pub code: WarningCode,
    pub message: String,
    pub page: Option<u32>,
    pub cell: Option<usize>,
}

impl ExtractWarning {
    #[must_use]
    pub fn new(code: WarningCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            page: None,
            cell: None,
        }
    }

    #[must_use]
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    #[must_use]
    pub fn with_cell(mut self, cell: usize) -> Self {
        self.cell = Some(cell);
        self
    }
}
