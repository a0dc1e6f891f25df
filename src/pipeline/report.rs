//! Report Assembler: lays out the summary and writes it as a PDF.
//!
//! Layout and rendering are split. [`layout_report`] turns the analysis
//! into styled lines in fixed order (title, insights, ratios, analytics,
//! recommendations); [`render_pdf`] wraps, paginates and writes them with
//! lopdf using the standard Helvetica fonts, so no font files are needed.
//!
//! Content streams are left uncompressed. Reports are small and tests can
//! search the raw bytes for a ratio line.

use crate::error::AnalysisError;
use crate::output::{AnalysisOutput, InsightSection, SectionKind, TableRatios};
use crate::pipeline::postprocess::{clean_insight_text, split_bullets};
use crate::ratios::RatioSet;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};
use tracing::debug;

// A4 in points.
const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 50.0;
const BULLET_INDENT: f32 = 14.0;

pub const NO_RATIOS_TEXT: &str = "No ratio data could be extracted.";

/// Visual role of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    Title,
    Subtitle,
    Heading,
    Subheading,
    Body,
    Bullet,
    /// Placeholder for a failed section.
    Note,
}

impl LineStyle {
    fn font_size(self) -> f32 {
        match self {
            LineStyle::Title => 18.0,
            LineStyle::Heading => 14.0,
            LineStyle::Subheading => 12.0,
            LineStyle::Subtitle | LineStyle::Body | LineStyle::Bullet | LineStyle::Note => 11.0,
        }
    }

    fn bold(self) -> bool {
        matches!(self, LineStyle::Title | LineStyle::Heading | LineStyle::Subheading)
    }

    fn space_before(self) -> f32 {
        match self {
            LineStyle::Heading => 12.0,
            LineStyle::Subheading => 6.0,
            _ => 0.0,
        }
    }

    fn indent(self) -> f32 {
        if self == LineStyle::Bullet {
            BULLET_INDENT
        } else {
            0.0
        }
    }

    /// Characters per line, from Helvetica's average glyph width (~0.5em).
    fn wrap_width(self) -> usize {
        let usable = PAGE_WIDTH - 2.0 * MARGIN - self.indent();
        (usable / (self.font_size() * 0.5)) as usize
    }
}

/// One logical line of the report, before wrapping.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportLine {
    pub style: LineStyle,
    pub text: String,
}

impl ReportLine {
    fn new(style: LineStyle, text: impl Into<String>) -> Self {
        Self {
            style,
            text: text.into(),
        }
    }
}

/// Body of an insight section as the report shows it.
#[derive(Debug, Clone, PartialEq)]
pub enum SectionBody {
    Bullets(Vec<String>),
    Unavailable(String),
}

impl SectionBody {
    pub fn from_section(section: &InsightSection) -> Self {
        match section.placeholder() {
            Some(p) => SectionBody::Unavailable(p),
            None => SectionBody::Bullets(section.bullets.clone()),
        }
    }

    /// Raw model text, split one bullet per line.
    pub fn from_text(text: &str) -> Self {
        SectionBody::Bullets(split_bullets(&clean_insight_text(text)))
    }
}

/// Everything the report shows.
#[derive(Debug, Clone)]
pub struct ReportContent<'a> {
    pub title: &'a str,
    pub subtitle: Option<String>,
    pub insights: SectionBody,
    pub ratios: &'a [TableRatios],
    pub analytics: SectionBody,
    pub recommendations: Option<SectionBody>,
}

impl<'a> ReportContent<'a> {
    pub fn from_output(output: &'a AnalysisOutput, title: &'a str) -> Self {
        let meta = &output.document.metadata;
        let subtitle = match (&meta.title, &meta.author) {
            (Some(t), Some(a)) => Some(format!("{t} ({a})")),
            (Some(t), None) => Some(t.clone()),
            (None, Some(a)) => Some(a.clone()),
            (None, None) => None,
        };
        Self {
            title,
            subtitle,
            insights: SectionBody::from_section(&output.insights),
            ratios: &output.ratios,
            analytics: SectionBody::from_section(&output.analytics),
            recommendations: output.recommendations.as_ref().map(SectionBody::from_section),
        }
    }
}

fn push_section(lines: &mut Vec<ReportLine>, kind: SectionKind, body: &SectionBody) {
    lines.push(ReportLine::new(LineStyle::Heading, kind.title()));
    match body {
        SectionBody::Bullets(bullets) if bullets.is_empty() => {
            lines.push(ReportLine::new(LineStyle::Note, "No content was returned."));
        }
        SectionBody::Bullets(bullets) => {
            lines.extend(bullets.iter().map(|b| ReportLine::new(LineStyle::Bullet, b.as_str())));
        }
        SectionBody::Unavailable(msg) => lines.push(ReportLine::new(LineStyle::Note, msg.as_str())),
    }
}

/// Lay out the report in its fixed order.
pub fn layout_report(content: &ReportContent<'_>) -> Vec<ReportLine> {
    let mut lines = vec![ReportLine::new(LineStyle::Title, content.title)];
    if let Some(ref sub) = content.subtitle {
        lines.push(ReportLine::new(LineStyle::Subtitle, sub.as_str()));
    }

    push_section(&mut lines, SectionKind::Insights, &content.insights);

    lines.push(ReportLine::new(LineStyle::Heading, "Financial Ratios"));
    let non_empty: Vec<&TableRatios> = content.ratios.iter().filter(|s| !s.ratios.is_empty()).collect();
    if non_empty.is_empty() {
        lines.push(ReportLine::new(LineStyle::Note, NO_RATIOS_TEXT));
    }
    let labelled = non_empty.len() > 1;
    for set in non_empty {
        if labelled {
            lines.push(ReportLine::new(LineStyle::Subheading, set.label()));
        }
        lines.extend(
            set.ratios
                .iter()
                .map(|r| ReportLine::new(LineStyle::Body, format!("{}: {}", r.name, r.value))),
        );
    }

    push_section(&mut lines, SectionKind::Analytics, &content.analytics);
    if let Some(ref rec) = content.recommendations {
        push_section(&mut lines, SectionKind::Recommendations, rec);
    }
    lines
}

/// Greedy word wrap at `width` characters; longer words are split.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut out = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let mut chars: Vec<char> = word.chars().collect();
        while chars.len() > width {
            if current_len > 0 {
                out.push(std::mem::take(&mut current));
                current_len = 0;
            }
            out.push(chars.drain(..width).collect());
        }
        let word_len = chars.len();
        if word_len == 0 {
            continue;
        }
        if current_len > 0 && current_len + 1 + word_len > width {
            out.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.extend(chars);
        current_len += word_len;
    }
    if current_len > 0 {
        out.push(current);
    }
    out
}

/// Encode text for a WinAnsiEncoding font. Unmappable characters become `?`.
pub fn to_win_ansi(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\u{20}'..='\u{7E}' => out.push(ch as u8),
            '\u{A0}'..='\u{FF}' => out.push(ch as u32 as u8),
            '€' => out.push(0x80),
            '…' => out.push(0x85),
            '‘' => out.push(0x91),
            '’' => out.push(0x92),
            '“' => out.push(0x93),
            '”' => out.push(0x94),
            '•' => out.push(0x95),
            '–' => out.push(0x96),
            '—' => out.push(0x97),
            '−' => out.push(b'-'),
            '₹' => out.extend_from_slice(b"Rs."),
            '\t' => out.push(b' '),
            _ => out.push(b'?'),
        }
    }
    out
}

/// A wrapped, positioned line on a page.
struct PlacedLine {
    x: f32,
    y: f32,
    size: f32,
    bold: bool,
    bytes: Vec<u8>,
}

fn paginate(lines: &[ReportLine]) -> Vec<Vec<PlacedLine>> {
    let mut pages = vec![Vec::new()];
    let mut y = PAGE_HEIGHT - MARGIN;

    for line in lines {
        let size = line.style.font_size();
        let leading = size * 1.4;
        let first_page_top = pages.len() == 1 && pages[0].is_empty();
        if !first_page_top {
            y -= line.style.space_before();
        }

        for (i, piece) in wrap_text(&line.text, line.style.wrap_width()).into_iter().enumerate() {
            if y - leading < MARGIN {
                pages.push(Vec::new());
                y = PAGE_HEIGHT - MARGIN;
            }
            y -= leading;

            let mut bytes = Vec::new();
            if line.style == LineStyle::Bullet && i == 0 {
                bytes.extend_from_slice(&[0x95, b' ']);
            }
            bytes.extend(to_win_ansi(&piece));

            let x = if line.style == LineStyle::Bullet && i > 0 {
                MARGIN + BULLET_INDENT + 8.0
            } else {
                MARGIN + line.style.indent()
            };
            if let Some(page) = pages.last_mut() {
                page.push(PlacedLine {
                    x,
                    y,
                    size,
                    bold: line.style.bold(),
                    bytes,
                });
            }
        }
    }
    pages
}

fn page_content(lines: &[PlacedLine]) -> Content {
    let mut operations = Vec::with_capacity(lines.len() * 4);
    for line in lines {
        let font = if line.bold { "F2" } else { "F1" };
        operations.push(Operation::new("BT", vec![]));
        operations.push(Operation::new(
            "Tf",
            vec![Object::Name(font.as_bytes().to_vec()), Object::Real(line.size)],
        ));
        operations.push(Operation::new("Td", vec![Object::Real(line.x), Object::Real(line.y)]));
        operations.push(Operation::new(
            "Tj",
            vec![Object::String(line.bytes.clone(), StringFormat::Literal)],
        ));
        operations.push(Operation::new("ET", vec![]));
    }
    Content { operations }
}

fn font(doc: &mut Document, base: &str) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base,
        "Encoding" => "WinAnsiEncoding",
    })
}

/// Write laid-out lines as a PDF document.
pub fn render_pdf(lines: &[ReportLine], title: &str) -> Result<Vec<u8>, AnalysisError> {
    let pages = paginate(lines);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let regular = font(&mut doc, "Helvetica");
    let bold = font(&mut doc, "Helvetica-Bold");
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular,
            "F2" => bold,
        },
    });

    let mut kids = Vec::with_capacity(pages.len());
    for placed in &pages {
        let encoded = page_content(placed)
            .encode()
            .map_err(|e| AnalysisError::ReportFailed(e.to_string()))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    let page_count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(page_count),
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(PAGE_WIDTH),
                Object::Real(PAGE_HEIGHT),
            ],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::String(to_win_ansi(title), StringFormat::Literal),
        "Producer" => Object::String(b"edgequake-fininsight".to_vec(), StringFormat::Literal),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf)
        .map_err(|e| AnalysisError::ReportFailed(e.to_string()))?;
    debug!("Report: {} pages, {} bytes", page_count, buf.len());
    Ok(buf)
}

/// Assemble a report from raw model text and a single ratio set.
pub fn assemble(
    insights: &str,
    ratios: &RatioSet,
    analytics: &str,
    title: &str,
) -> Result<Vec<u8>, AnalysisError> {
    let sets = [TableRatios {
        table_index: None,
        page: None,
        source_tables: Vec::new(),
        ratios: ratios.clone(),
    }];
    let content = ReportContent {
        title,
        subtitle: None,
        insights: SectionBody::from_text(insights),
        ratios: &sets,
        analytics: SectionBody::from_text(analytics),
        recommendations: None,
    };
    render_pdf(&layout_report(&content), title)
}

/// Assemble the report for a full analysis run.
pub fn assemble_output(output: &AnalysisOutput, title: &str) -> Result<Vec<u8>, AnalysisError> {
    let content = ReportContent::from_output(output, title);
    render_pdf(&layout_report(&content), title)
}
