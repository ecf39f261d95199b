use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in PDF points, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    #[must_use]
    pub const fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    #[must_use]
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    #[must_use]
    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    #[must_use]
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    #[must_use]
    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    pub rects: Vec<Rect>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridParameters {
    pub column_starts: Vec<f32>,
    pub column_span: f32,
    pub row_span: f32,
    pub top_margin: f32,
    pub row_count: usize,
}

impl GridParameters {
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.column_starts.len()
    }

    #[must_use]
    pub fn is_complete_3x3(&self) -> bool {
        self.column_count() == 3 && self.row_count == 3
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CardCell {
    pub rect: Rect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridMethod {
    #[serde(rename = "art-boxes")]
    ArtBoxes,
    #[serde(rename = "reference-grid")]
    ReferenceGrid,
    #[serde(rename = "image-contours")]
    ImageContours,
    #[serde(rename = "none")]
    None,
}

impl GridMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ArtBoxes => "art-boxes",
            Self::ReferenceGrid => "reference-grid",
            Self::ImageContours => "image-contours",
            Self::None => "none",
        }
    }
}

impl std::fmt::Display for GridMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Text fragment as reported by the page source, in absolute page points.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSpan {
    pub text: String,
    pub size: f32,
    pub bold: bool,
    pub italic: bool,
    pub bbox: Rect,
}

/// Normalized fragment with coordinates relative to its cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSpan {
    pub text: String,
    pub size: f32,
    pub bold: bool,
    pub italic: bool,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "origine")]
    Origin,
    #[serde(rename = "comunità")]
    Community,
    #[serde(rename = "dominio")]
    Domain,
}

impl Category {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Origin => "origine",
            Self::Community => "comunità",
            Self::Domain => "dominio",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Arcano,
    Lama,
    Osso,
    Codice,
    Grazia,
    Mezzanotte,
    Saggio,
    Splendore,
    Valore,
    #[serde(rename = "sconosciuto")]
    Unknown,
}

impl Domain {
    pub const ALL: [Self; 9] = [
        Self::Arcano,
        Self::Lama,
        Self::Osso,
        Self::Codice,
        Self::Grazia,
        Self::Mezzanotte,
        Self::Saggio,
        Self::Splendore,
        Self::Valore,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Arcano => "arcano",
            Self::Lama => "lama",
            Self::Osso => "osso",
            Self::Codice => "codice",
            Self::Grazia => "grazia",
            Self::Mezzanotte => "mezzanotte",
            Self::Saggio => "saggio",
            Self::Splendore => "splendore",
            Self::Valore => "valore",
            Self::Unknown => "sconosciuto",
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubCategory {
    #[serde(rename = "classi")]
    Class,
    #[serde(rename = "abilita")]
    Ability,
}

impl SubCategory {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Class => "classi",
            Self::Ability => "abilita",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardMetadata {
    pub nome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_carta: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soglia: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub livello: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub costo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tipo_carta: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub nome_abilita: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub testo_sapore: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub testo: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardRecord {
    #[serde(rename = "categoria")]
    pub category: Category,
    #[serde(rename = "dominio")]
    pub domain: Option<Domain>,
    #[serde(rename = "sottocategoria", skip_serializing_if = "Option::is_none")]
    pub sub_category: Option<SubCategory>,
    #[serde(rename = "pagina")]
    pub page: u32,
    #[serde(rename = "indice_carta")]
    pub cell_index: usize,
    #[serde(skip)]
    pub sequence: usize,
    #[serde(flatten)]
    pub metadata: CardMetadata,
}

impl CardRecord {
    /// Output bucket label, e.g. `domini/arcano/abilita`.
    #[must_use]
    pub fn label(&self) -> String {
        match (self.domain, self.sub_category) {
            (Some(domain), Some(sub)) => format!("domini/{domain}/{}", sub.as_str()),
            _ => self.category.as_str().to_string(),
        }
    }

    /// Manifest id: the printed card code, or a page/cell fallback.
    #[must_use]
    pub fn manifest_id(&self) -> String {
        self.metadata
            .id_carta
            .clone()
            .unwrap_or_else(|| format!("p{}c{}", self.page, self.cell_index))
    }
}
