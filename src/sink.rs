//! On-disk layout of an extraction run.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use csv::WriterBuilder;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect as DrawRect;
use serde::Serialize;
use tracing::info;
use unicode_normalization::UnicodeNormalization;

use crate::crop::PixelBox;
use crate::error::ExtractError;
use crate::model::{CardRecord, Category, Domain, SubCategory};
use crate::pipeline::{CardSink, RunSummary};

pub const DOMAINS_DIR: &str = "domini";
pub const DEBUG_DIR: &str = "_debug";
pub const INDEX_JSON: &str = "index.json";
pub const INDEX_CSV: &str = "index.csv";
pub const SUMMARY_JSON: &str = "summary.json";

const MAX_FILENAME_CHARS: usize = 60;
const FALLBACK_FILENAME: &str = "carta";
const OVERLAY_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const OVERLAY_THICKNESS: u32 = 4;

const INDEX_HEADERS: [&str; 11] = [
    "id",
    "nome",
    "categoria",
    "dominio",
    "sottocategoria",
    "tipo_carta",
    "livello",
    "soglia",
    "pagina",
    "img",
    "json",
];

/// ASCII slug for file names: `Sigillo Runico!` becomes `sigillo_runico`.
#[must_use]
pub fn safe_filename(text: &str) -> String {
    let cleaned = text
        .nfkd()
        .filter(|&ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-') || ch.is_ascii_whitespace())
        .collect::<String>();
    let slug = cleaned
        .split_ascii_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .trim_matches('_')
        .to_lowercase();
    if slug.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        slug.chars().take(MAX_FILENAME_CHARS).collect()
    }
}

/// Compact manifest entry, one per saved card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexEntry {
    pub id: String,
    pub nome: String,
    pub categoria: Category,
    pub dominio: Option<Domain>,
    pub sottocategoria: Option<SubCategory>,
    pub tipo_carta: Option<String>,
    pub livello: Option<i64>,
    pub soglia: Option<i64>,
    pub pagina: u32,
    pub img: String,
    pub json: String,
}

impl IndexEntry {
    fn csv_record(&self) -> [String; 11] {
        let optional = |value: Option<String>| value.unwrap_or_default();
        [
            self.id.clone(),
            self.nome.clone(),
            self.categoria.as_str().to_string(),
            optional(self.dominio.map(|domain| domain.as_str().to_string())),
            optional(self.sottocategoria.map(|sub| sub.as_str().to_string())),
            optional(self.tipo_carta.clone()),
            optional(self.livello.map(|value| value.to_string())),
            optional(self.soglia.map(|value| value.to_string())),
            self.pagina.to_string(),
            self.img.clone(),
            self.json.clone(),
        ]
    }
}

#[derive(Serialize)]
struct CardFile<'a> {
    #[serde(flatten)]
    record: &'a CardRecord,
    img_path: &'a str,
    json_path: &'a str,
}

#[derive(Serialize)]
struct SummaryFile<'a> {
    generated_at: String,
    #[serde(flatten)]
    summary: &'a RunSummary,
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ExtractError> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, value)?;
    Ok(())
}

/// Writes cards as PNG + JSON pairs under category directories, plus manifests.
#[derive(Debug)]
pub struct DirectorySink {
    root: PathBuf,
    index: Vec<IndexEntry>,
}

impl DirectorySink {
    /// Recreates `root` from scratch with the fixed category directories.
    pub fn create(root: &Path) -> Result<Self, ExtractError> {
        if root.exists() {
            fs::remove_dir_all(root)?;
        }
        for category in [Category::Origin.as_str(), Category::Community.as_str(), DOMAINS_DIR] {
            fs::create_dir_all(root.join(category))?;
        }
        Ok(Self {
            root: root.to_path_buf(),
            index: Vec::new(),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn entries(&self) -> &[IndexEntry] {
        &self.index
    }

    fn write_index_csv(&self, path: &Path) -> Result<(), ExtractError> {
        let mut writer = WriterBuilder::new().from_path(path)?;
        writer.write_record(INDEX_HEADERS)?;
        for entry in &self.index {
            writer.write_record(entry.csv_record())?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl CardSink for DirectorySink {
    fn accept(&mut self, record: &CardRecord, image: &RgbImage) -> Result<(), ExtractError> {
        let label = record.label();
        fs::create_dir_all(self.root.join(&label))?;

        let base = format!("{}_{:03}", safe_filename(&record.metadata.nome), record.sequence);
        let img_path = format!("{label}/{base}.png");
        let json_path = format!("{label}/{base}.json");

        image.save(self.root.join(&img_path))?;
        write_json(
            &self.root.join(&json_path),
            &CardFile {
                record,
                img_path: &img_path,
                json_path: &json_path,
            },
        )?;

        let parse_int = |value: &Option<String>| value.as_deref().and_then(|text| text.parse().ok());
        self.index.push(IndexEntry {
            id: record.manifest_id(),
            nome: record.metadata.nome.clone(),
            categoria: record.category,
            dominio: record.domain,
            sottocategoria: record.sub_category,
            tipo_carta: record.metadata.tipo_carta.clone(),
            livello: parse_int(&record.metadata.livello),
            soglia: parse_int(&record.metadata.soglia),
            pagina: record.page,
            img: img_path,
            json: json_path,
        });
        Ok(())
    }

    fn debug_page(&mut self, page: u32, image: &RgbImage, cells: &[PixelBox]) -> Result<(), ExtractError> {
        let mut overlay = image.clone();
        for cell in cells {
            for inset in 0..OVERLAY_THICKNESS {
                let width = cell.width().saturating_sub(2 * inset);
                let height = cell.height().saturating_sub(2 * inset);
                if width == 0 || height == 0 {
                    break;
                }
                let (Ok(x), Ok(y)) = (i32::try_from(cell.x0 + inset), i32::try_from(cell.y0 + inset)) else {
                    break;
                };
                draw_hollow_rect_mut(&mut overlay, DrawRect::at(x, y).of_size(width, height), OVERLAY_COLOR);
            }
        }

        let dir = self.root.join(DEBUG_DIR);
        fs::create_dir_all(&dir)?;
        overlay.save(dir.join(format!("page_{page:03}.png")))?;
        Ok(())
    }

    fn finish(&mut self, summary: &RunSummary) -> Result<(), ExtractError> {
        write_json(&self.root.join(INDEX_JSON), &self.index)?;
        self.write_index_csv(&self.root.join(INDEX_CSV))?;
        write_json(
            &self.root.join(SUMMARY_JSON),
            &SummaryFile {
                generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                summary,
            },
        )?;
        info!(entries = self.index.len(), root = %self.root.display(), "manifests written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::{DirectorySink, safe_filename};
    use crate::crop::PixelBox;
    use crate::model::{CardMetadata, CardRecord, Category, Domain, SubCategory};
    use crate::pipeline::{CardSink, RunSummary};

    fn ability(nome: &str, sequence: usize) -> CardRecord {
        CardRecord {
            category: Category::Domain,
            domain: Some(Domain::Arcano),
            sub_category: Some(SubCategory::Ability),
            page: 12,
            cell_index: 4,
            sequence,
            metadata: CardMetadata {
                nome: nome.to_string(),
                soglia: Some("2".to_string()),
                livello: Some("4+".to_string()),
                ..CardMetadata::default()
            },
        }
    }

    #[test]
    fn slugs_are_ascii_lowercase_and_bounded() {
        assert_eq!(safe_filename("Sigillo Runico!"), "sigillo_runico");
        assert_eq!(safe_filename("  Comunità  dell'Alba "), "comunita_dellalba");
        assert_eq!(safe_filename("✦✦✦"), "carta");
        assert_eq!(safe_filename(&"a".repeat(80)).len(), 60);
    }

    #[test]
    fn writes_card_files_and_manifests() {
        let dir = tempdir().expect("tempdir should be created");
        let root = dir.path().join("out");
        let mut sink = DirectorySink::create(&root).expect("sink should be created");

        let image = RgbImage::from_pixel(40, 60, Rgb([10, 20, 30]));
        sink.accept(&ability("SIGILLO RUNICO", 3), &image)
            .expect("card should be written");
        sink.finish(&RunSummary::default()).expect("manifests should be written");

        let png = root.join("domini/arcano/abilita/sigillo_runico_003.png");
        assert!(png.exists());
        let card: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(root.join("domini/arcano/abilita/sigillo_runico_003.json"))
                .expect("card json should be readable"),
        )
        .expect("card json should parse");
        assert_eq!(card["img_path"], "domini/arcano/abilita/sigillo_runico_003.png");
        assert_eq!(card["categoria"], "dominio");
        assert_eq!(card["sottocategoria"], "abilita");

        let index: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(root.join("index.json")).expect("index should be readable"),
        )
        .expect("index should parse");
        assert_eq!(index[0]["id"], "p12c4");
        assert_eq!(index[0]["soglia"], 2);
        assert!(index[0]["livello"].is_null());

        let csv = std::fs::read_to_string(root.join("index.csv")).expect("csv should be readable");
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("id,nome,categoria,dominio,sottocategoria,tipo_carta,livello,soglia,pagina,img,json")
        );
        assert_eq!(
            lines.next(),
            Some("p12c4,SIGILLO RUNICO,dominio,arcano,abilita,,,2,12,domini/arcano/abilita/sigillo_runico_003.png,domini/arcano/abilita/sigillo_runico_003.json")
        );

        let summary = std::fs::read_to_string(root.join("summary.json")).expect("summary should be readable");
        assert!(summary.contains("generated_at"));
    }

    #[test]
    fn create_clears_previous_runs() {
        let dir = tempdir().expect("tempdir should be created");
        let root = dir.path().join("out");
        std::fs::create_dir_all(root.join("stale")).expect("stale dir should be created");

        DirectorySink::create(&root).expect("sink should be created");
        assert!(!root.join("stale").exists());
        assert!(root.join("origine").is_dir());
        assert!(root.join("comunità").is_dir());
        assert!(root.join("domini").is_dir());
    }

    #[test]
    fn debug_overlay_outlines_cells() {
        let dir = tempdir().expect("tempdir should be created");
        let mut sink = DirectorySink::create(&dir.path().join("out")).expect("sink should be created");
        let page = RgbImage::from_pixel(100, 100, Rgb([255, 255, 255]));
        let cells = [PixelBox {
            x0: 10,
            y0: 10,
            x1: 60,
            y1: 80,
        }];

        sink.debug_page(3, &page, &cells).expect("overlay should be written");
        let overlay = image::open(sink.root().join("_debug/page_003.png"))
            .expect("overlay should load")
            .to_rgb8();
        assert_eq!(overlay.get_pixel(10, 40), &Rgb([255, 0, 0]));
        assert_eq!(overlay.get_pixel(13, 40), &Rgb([255, 0, 0]));
        assert_eq!(overlay.get_pixel(30, 40), &Rgb([255, 255, 255]));
    }
}
