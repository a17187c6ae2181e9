//! Export renderers.
//!
//! Renderers turn an [`ExportSnapshot`] into bytes. They never consult the store.

use crate::export::{ExportRow, ExportSnapshot};
use crate::{FormulationError, FormulationResult};
use std::fmt;
use std::str::FromStr;

/// A rendered export, ready to be written to a file or an HTTP response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedDocument {
    pub media_type: &'static str,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

pub trait SnapshotRenderer: Send + Sync {
    fn media_type(&self) -> &'static str;

    fn file_extension(&self) -> &'static str;

    fn render(&self, snapshot: &ExportSnapshot) -> FormulationResult<Vec<u8>>;

    fn render_document(&self, snapshot: &ExportSnapshot) -> FormulationResult<RenderedDocument> {
        Ok(RenderedDocument {
            media_type: self.media_type(),
            file_name: format!(
                "{}.{}",
                file_stem(&snapshot.title),
                self.file_extension()
            ),
            bytes: self.render(snapshot)?,
        })
    }
}

/// Pretty-printed JSON of the whole snapshot.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonRenderer;

impl SnapshotRenderer for JsonRenderer {
    fn media_type(&self) -> &'static str {
        "application/json"
    }

    fn file_extension(&self) -> &'static str {
        "json"
    }

    fn render(&self, snapshot: &ExportSnapshot) -> FormulationResult<Vec<u8>> {
        serde_json::to_vec_pretty(snapshot).map_err(|e| FormulationError::Render(e.to_string()))
    }
}

/// A printable formulation sheet in Markdown.
///
/// Layout: title, cover, batch line, component table with a totals row, notes, footer.
#[derive(Clone, Copy, Debug, Default)]
pub struct MarkdownRenderer;

impl SnapshotRenderer for MarkdownRenderer {
    fn media_type(&self) -> &'static str {
        "text/markdown; charset=utf-8"
    }

    fn file_extension(&self) -> &'static str {
        "md"
    }

    fn render(&self, snapshot: &ExportSnapshot) -> FormulationResult<Vec<u8>> {
        let mut out = String::new();

        out.push_str(&format!("# {}\n\n", escape_inline(&snapshot.title)));

        if let Some(cover) = &snapshot.cover {
            out.push_str(&format!("![Cover]({})\n\n", cover.data_url()));
        }

        out.push_str(&format!(
            "**Batch:** {} ml  \n**Status:** {}\n",
            format_number(snapshot.batch_volume_ml),
            escape_inline(&snapshot.status)
        ));
        if !snapshot.tags.is_empty() {
            let tags: Vec<String> = snapshot.tags.iter().map(|t| escape_inline(t)).collect();
            out.push_str(&format!("**Tags:** {}\n", tags.join(", ")));
        }
        out.push('\n');

        let with_parts = snapshot.totals.parts.is_some();
        if with_parts {
            out.push_str("| # | Material | Parts | % of total | Amount (ml) |\n");
            out.push_str("|---:|---|---:|---:|---:|\n");
        } else {
            out.push_str("| # | Material | % of total | Amount (ml) |\n");
            out.push_str("|---:|---|---:|---:|\n");
        }
        for row in &snapshot.rows {
            out.push_str(&table_row(row, with_parts));
        }

        let totals = &snapshot.totals;
        match totals.parts {
            Some(parts) => out.push_str(&format!(
                "| | **Total** | **{}** | **{}** | **{}** |\n",
                format_number(parts),
                format_number(totals.percentage),
                format_number(totals.amount_ml)
            )),
            None => out.push_str(&format!(
                "| | **Total** | **{}** | **{}** |\n",
                format_number(totals.percentage),
                format_number(totals.amount_ml)
            )),
        }

        let notes = snapshot.notes.trim();
        if !notes.is_empty() {
            out.push_str("\n## Notes\n\n");
            out.push_str(notes);
            out.push('\n');
        }

        let footer: Vec<String> = [
            snapshot
                .footer
                .updated_at_text
                .as_ref()
                .map(|t| format!("Updated {t}")),
            snapshot.footer.user_email.clone(),
        ]
        .into_iter()
        .flatten()
        .collect();
        if !footer.is_empty() {
            out.push_str(&format!("\n---\n\n_{}_\n", footer.join(" · ")));
        }

        Ok(out.into_bytes())
    }
}

fn table_row(row: &ExportRow, with_parts: bool) -> String {
    let material = escape_cell(&row.material);
    match (with_parts, row.parts) {
        (true, parts) => format!(
            "| {} | {} | {} | {} | {} |\n",
            row.index,
            material,
            format_number(parts.unwrap_or(0.0)),
            format_number(row.percentage),
            format_number(row.amount_ml)
        ),
        (false, _) => format!(
            "| {} | {} | {} | {} |\n",
            row.index,
            material,
            format_number(row.percentage),
            format_number(row.amount_ml)
        ),
    }
}

/// Two decimal places, without trailing zeros.
fn format_number(value: f64) -> String {
    let fixed = format!("{value:.2}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

fn escape_inline(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '*' | '_' | '`' | '[' | ']' | '#') {
            out.push('\\');
        }
        if c == '\n' || c == '\r' {
            out.push(' ');
        } else {
            out.push(c);
        }
    }
    out
}

fn escape_cell(text: &str) -> String {
    escape_inline(text).replace('|', "\\|")
}

fn file_stem(title: &str) -> String {
    let stem: String = title
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let collapsed = stem
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if collapsed.is_empty() {
        "formulation".to_string()
    } else {
        collapsed
    }
}

/// Output format selectable by clients.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExportFormat {
    #[default]
    Json,
    Markdown,
}

impl ExportFormat {
    pub fn renderer(self) -> Box<dyn SnapshotRenderer> {
        match self {
            Self::Json => Box::new(JsonRenderer),
            Self::Markdown => Box::new(MarkdownRenderer),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = FormulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "markdown" | "md" => Ok(Self::Markdown),
            other => Err(FormulationError::InvalidInput(format!(
                "unknown export format: {other}"
            ))),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Markdown => "markdown",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{ExportFooter, InlineImage};
    use crate::formulation::{Formulation, MetadataPatch};
    use crate::identity::Owner;
    use crate::row::{QuantityBasis, RowPatch};

    fn seeded_snapshot(footer: ExportFooter, cover: Option<InlineImage>) -> ExportSnapshot {
        let mut f = Formulation::seeded(Owner {
            id: "u1".into(),
            display_name: "Ada".into(),
        });
        f.set_metadata(MetadataPatch {
            title: Some("Sea Breeze".into()),
            notes: Some("Rest *one* week.".into()),
            ..Default::default()
        });
        ExportSnapshot::build(&f, None, cover, footer)
    }

    #[test]
    fn test_markdown_sheet_contains_table_and_totals() {
        let snapshot = seeded_snapshot(
            ExportFooter {
                updated_at_text: Some("2024-05-01 10:00 UTC".into()),
                user_email: Some("ada@example.com".into()),
            },
            None,
        );
        let text = String::from_utf8(MarkdownRenderer.render(&snapshot).unwrap()).unwrap();

        assert!(text.starts_with("# Sea Breeze\n"));
        assert!(text.contains("| # | Material | Parts | % of total | Amount (ml) |"));
        assert!(text.contains("| 1 | Ethanol | 45 | 78.95 | 394.74 |"));
        assert!(text.contains("| 2 | Calone (10%) | 12 | 21.05 | 105.26 |"));
        assert!(text.contains("| | **Total** | **57** | **100** | **500** |"));
        assert!(text.contains("## Notes\n\nRest *one* week."));
        assert!(text.contains("_Updated 2024-05-01 10:00 UTC · ada@example.com_"));
    }

    #[test]
    fn test_markdown_embeds_cover_inline() {
        let cover = InlineImage::new("image/png", &[1, 2, 3]);
        let snapshot = seeded_snapshot(ExportFooter::default(), Some(cover.clone()));
        let text = String::from_utf8(MarkdownRenderer.render(&snapshot).unwrap()).unwrap();

        assert!(text.contains(&format!("![Cover]({})", cover.data_url())));
        assert!(!text.contains("---\n\n_"));
    }

    #[test]
    fn test_markdown_percentage_sheet_omits_parts() {
        let mut f = Formulation::new(Owner::default(), QuantityBasis::Percentage);
        let id = f.add_row();
        f.update_row(&id, RowPatch::name("Rose | absolute"));
        f.update_row(&id, RowPatch::quantity(25));
        let snapshot = ExportSnapshot::build(&f, None, None, ExportFooter::default());
        let text = String::from_utf8(MarkdownRenderer.render(&snapshot).unwrap()).unwrap();

        assert!(text.contains("| # | Material | % of total | Amount (ml) |"));
        assert!(text.contains("| 1 | Rose \\| absolute | 25 | 125 |"));
        assert!(text.contains("| | **Total** | **25** | **125** |"));
    }

    #[test]
    fn test_json_render_is_snapshot() {
        let snapshot = seeded_snapshot(ExportFooter::default(), None);
        let bytes = JsonRenderer.render(&snapshot).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["title"], "Sea Breeze");
        assert_eq!(value["rows"][0]["material"], "Ethanol");
        assert_eq!(value["totals"]["parts"], 57.0);
        assert_eq!(value["basis"], "ratio");
    }

    #[test]
    fn test_render_document_file_name() {
        let snapshot = seeded_snapshot(ExportFooter::default(), None);
        let doc = MarkdownRenderer.render_document(&snapshot).unwrap();
        assert_eq!(doc.file_name, "sea-breeze.md");
        assert_eq!(doc.media_type, "text/markdown; charset=utf-8");
    }

    #[test]
    fn test_export_format_parse() {
        assert_eq!("MD".parse::<ExportFormat>().unwrap(), ExportFormat::Markdown);
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("pdf".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(45.0), "45");
        assert_eq!(format_number(78.947_368), "78.95");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(0.0), "0");
    }
}
