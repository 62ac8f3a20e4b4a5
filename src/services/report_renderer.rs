use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local};
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::models::record::Insight;
use crate::models::section::{AggregatedSnapshot, SectionData, SectionName};

const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const MARGIN: f32 = 18.0;
const BODY_CHARS: usize = 95;
const BULLET_CHARS: usize = 90;
/// Courier 8.5pt across the printable width.
const ROW_CHARS: usize = 96;

/// One downloadable document and the sections it contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    MarketOverview,
    SectorFii,
    NewsHighlights,
    Indicators,
    TechnicalSnapshot,
    TopPerformers,
    Comprehensive,
}

impl ReportKind {
    pub fn title(&self) -> &'static str {
        match self {
            ReportKind::MarketOverview => "Market Overview Report",
            ReportKind::SectorFii => "Sector Movement & FII/DII Activity Report",
            ReportKind::NewsHighlights => "News Highlights Report",
            ReportKind::Indicators => "Financial Indicators Report",
            ReportKind::TechnicalSnapshot => "Technical Snapshot Report",
            ReportKind::TopPerformers => "Top Gainers & Losers Report",
            ReportKind::Comprehensive => "Comprehensive Market Report",
        }
    }

    pub fn sections(&self) -> &'static [SectionName] {
        use SectionName::*;
        match self {
            ReportKind::MarketOverview => &[MarketOverview],
            ReportKind::SectorFii => &[SectorMovement, InstitutionalActivity],
            ReportKind::NewsHighlights => &[NewsHighlights],
            ReportKind::Indicators => &[FinancialIndicators],
            ReportKind::TechnicalSnapshot => &[TechnicalSnapshot],
            ReportKind::TopPerformers => &[TopPerformers],
            ReportKind::Comprehensive => &[
                MarketOverview,
                SectorMovement,
                InstitutionalActivity,
                TopPerformers,
                TechnicalSnapshot,
                FinancialIndicators,
                NewsHighlights,
                MarketAnalysis,
                MarketSummary,
                MarketPredictions,
            ],
        }
    }

    /// Whether the narrative sections must be collected too.
    pub fn needs_derived(&self) -> bool {
        self.sections().iter().any(|s| s.is_derived())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    Title(String),
    Heading(String),
    Subheading(String),
    Text(String),
    /// Fixed-width row, for tables.
    Row(String),
    Bullet(String),
    Gap,
}

pub struct RenderedReport {
    pub filename: String,
    pub bytes: Vec<u8>,
}

pub fn report_filename(now: DateTime<Local>) -> String {
    format!("Stock_Market_{}.pdf", now.format("%Y%m%d_%H%M%S"))
}

/// Built-in PDF fonts only cover Latin-1; everything is reduced to ASCII.
pub fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '₹' => out.push_str("Rs."),
            '•' | '–' | '—' | '−' => out.push('-'),
            '‘' | '’' => out.push('\''),
            '“' | '”' => out.push('"'),
            '…' => out.push_str("..."),
            '\t' => out.push(' '),
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            _ => {}
        }
    }
    out
}

/// Greedy word wrap on character count.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.len() + 1 + word.len() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Shorten `text` so it fits a `width`-character column with a space to spare.
fn fit(text: &str, width: usize) -> String {
    let text = sanitize(text);
    if text.chars().count() < width {
        return text;
    }
    let mut cut: String = text.chars().take(width.saturating_sub(3)).collect();
    cut.push_str("..");
    cut
}

fn insight_lines(lines: &mut Vec<Line>, heading: &str, insight: &Insight) {
    lines.push(Line::Subheading(heading.to_string()));
    for l in insight.lines() {
        lines.push(Line::Bullet(l.trim_start_matches("- ").to_string()));
    }
}

fn section_lines(lines: &mut Vec<Line>, name: SectionName, data: Option<&SectionData>) {
    lines.push(Line::Heading(name.title().to_string()));
    let data = match data {
        Some(d) if !d.is_failed() => d,
        Some(d) => {
            lines.push(Line::Text(format!("No data available ({})", d.error().unwrap_or("unknown error"))));
            lines.push(Line::Gap);
            return;
        }
        None => {
            lines.push(Line::Text("No data available".to_string()));
            lines.push(Line::Gap);
            return;
        }
    };
    if let Some(reason) = data.error() {
        lines.push(Line::Text(format!("Partial data: {}", reason)));
    }

    match data {
        SectionData::MarketOverview(r) => {
            lines.push(Line::Row(format!("{:<22}{:>11}{:>10}{:>9}{:>11}{:>11}", "Index", "Close", "Change", "Chg%", "High", "Low")));
            for entry in &r.record.payload.indices {
                match &entry.quote {
                    Some(q) => lines.push(Line::Row(format!(
                        "{:<22}{:>11.2}{:>10.2}{:>9.2}{:>11.2}{:>11.2}",
                        fit(&entry.name, 22), q.close, q.change, q.change_percent, q.high, q.low
                    ))),
                    None => lines.push(Line::Row(format!(
                        "{:<22}{}",
                        fit(&entry.name, 22),
                        fit(entry.error.as_deref().unwrap_or("Data unavailable"), ROW_CHARS - 22)
                    ))),
                }
            }
            insight_lines(lines, "Market Insights", &r.insights);
        }
        SectionData::SectorMovement(r) => {
            lines.push(Line::Row(format!("{:<28}{:>9}{:>10}{:>10}{:>11}", "Sector", "Chg%", "Advances", "Declines", "Companies")));
            for s in &r.record.payload.sectors {
                lines.push(Line::Row(format!(
                    "{:<28}{:>9.2}{:>10}{:>10}{:>11}",
                    fit(&s.sector_name, 28), s.change_percent, s.advances, s.declines, s.num_companies
                )));
            }
            insight_lines(lines, "Sector Insights", &r.insights);
        }
        SectionData::InstitutionalActivity(r) => {
            let a = &r.record.payload;
            lines.push(Line::Row(format!("{:<8}{:>16}{:>16}{:>16}", "", "Buy (Cr)", "Sell (Cr)", "Net (Cr)")));
            for (label, f) in [("FII", a.fii), ("DII", a.dii)] {
                lines.push(Line::Row(format!("{:<8}{:>16.2}{:>16.2}{:>16.2}", label, f.buy, f.sell, f.net)));
            }
            lines.push(Line::Text(format!("Source: {}", a.source)));
            insight_lines(lines, "Institutional Insights", &r.insights);
        }
        SectionData::TopPerformers(r) => {
            for (label, list) in [("Top Gainers", &r.record.payload.gainers), ("Top Losers", &r.record.payload.losers)] {
                lines.push(Line::Subheading(label.to_string()));
                if list.is_empty() {
                    lines.push(Line::Text("No data available".to_string()));
                }
                for s in list {
                    lines.push(Line::Row(format!(
                        "{:<40}{:>12.2}{:>10.2}{:>9.2}%",
                        fit(&s.name, 40), s.price, s.change, s.change_percent
                    )));
                }
            }
            insight_lines(lines, "Key Insights", &r.insights);
        }
        SectionData::TechnicalSnapshot(r) => {
            lines.push(Line::Text(format!("As of {}", r.record.payload.as_of)));
            lines.push(Line::Row(format!("{:<14}{:>11}{:>11}{:>8}{:>10}{:>10}", "Index", "Close", "Support", "RSI", "MACD", "Signal")));
            for t in &r.record.payload.readings {
                lines.push(Line::Row(format!(
                    "{:<14}{:>11.2}{:>11.2}{:>8.2}{:>10.2}{:>10.2}",
                    fit(&t.name, 14), t.close, t.support, t.rsi, t.macd, t.macd_signal
                )));
            }
            insight_lines(lines, "Technical Insights", &r.insights);
        }
        SectionData::FinancialIndicators(r) => {
            lines.push(Line::Row(format!("{:<20}{:>18}{:>10}  {}", "Indicator", "Value", "Change", "Remarks")));
            for i in &r.record.payload.indicators {
                lines.push(Line::Row(format!(
                    "{:<20}{:>18}{:>10}  {}",
                    fit(&i.name, 20),
                    fit(&i.value, 18),
                    fit(&i.percent_change, 10),
                    fit(&i.remarks, ROW_CHARS - 50)
                )));
            }
            insight_lines(lines, "Indicator Insights", &r.insights);
        }
        SectionData::NewsHighlights(r) => {
            insight_lines(lines, "News Impact", &r.insights);
            for (label, items) in [("India News", &r.record.payload.india_news), ("Global News", &r.record.payload.global_news)] {
                lines.push(Line::Subheading(label.to_string()));
                for item in items {
                    lines.push(Line::Bullet(item.trim_start_matches("- ").to_string()));
                }
            }
        }
        SectionData::MarketAnalysis(r) | SectionData::MarketSummary(r) | SectionData::MarketPredictions(r) => {
            for l in r.payload.lines() {
                lines.push(Line::Bullet(l.trim_start_matches("- ").to_string()));
            }
        }
    }
    lines.push(Line::Gap);
}

/// Document content, top to bottom. Sections the snapshot lacks get a placeholder.
pub fn report_lines(kind: ReportKind, snapshot: &AggregatedSnapshot, generated_at: DateTime<Local>) -> Vec<Line> {
    let mut lines = vec![
        Line::Title(kind.title().to_string()),
        Line::Text(format!("Generated on {}", generated_at.format("%B %d, %Y %H:%M"))),
        Line::Gap,
    ];
    for name in kind.sections() {
        section_lines(&mut lines, *name, snapshot.get(*name));
    }
    lines
}

// ========== PDF output ==========

struct PageWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    mono: IndirectFontRef,
    y: f32,
    pages: usize,
}

impl PageWriter {
    fn new(title: &str) -> Result<Self> {
        let (doc, page, layer) = PdfDocument::new(sanitize(title), Mm(PAGE_W), Mm(PAGE_H), "Page 1");
        let regular = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(|e| anyhow!("load Helvetica: {:?}", e))?;
        let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(|e| anyhow!("load Helvetica-Bold: {:?}", e))?;
        let mono = doc.add_builtin_font(BuiltinFont::Courier).map_err(|e| anyhow!("load Courier: {:?}", e))?;
        let layer = doc.get_page(page).get_layer(layer);
        Ok(Self { doc, layer, regular, bold, mono, y: PAGE_H - MARGIN, pages: 1 })
    }

    fn ensure_space(&mut self, height: f32) {
        if self.y - height >= MARGIN {
            return;
        }
        self.pages += 1;
        let (page, layer) = self.doc.add_page(Mm(PAGE_W), Mm(PAGE_H), format!("Page {}", self.pages));
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = PAGE_H - MARGIN;
    }

    fn write(&mut self, text: &str, size: f32, indent: f32, font: Font) {
        let height = size * 0.3528 + 1.8;
        self.ensure_space(height);
        self.y -= height;
        let font = match font {
            Font::Regular => &self.regular,
            Font::Bold => &self.bold,
            Font::Mono => &self.mono,
        };
        self.layer.use_text(sanitize(text), size, Mm(MARGIN + indent), Mm(self.y), font);
    }

    fn line(&mut self, line: &Line) {
        match line {
            Line::Title(t) => self.write(t, 18.0, 0.0, Font::Bold),
            Line::Heading(t) => {
                self.y -= 2.0;
                self.write(t, 14.0, 0.0, Font::Bold);
            }
            Line::Subheading(t) => self.write(t, 11.0, 0.0, Font::Bold),
            Line::Text(t) => {
                for chunk in wrap(&sanitize(t), BODY_CHARS) {
                    self.write(&chunk, 10.0, 0.0, Font::Regular);
                }
            }
            Line::Row(t) => {
                let row: String = sanitize(t).chars().take(ROW_CHARS).collect();
                self.write(&row, 8.5, 0.0, Font::Mono);
            }
            Line::Bullet(t) => {
                for (i, chunk) in wrap(&sanitize(t), BULLET_CHARS).iter().enumerate() {
                    let text = if i == 0 { format!("- {}", chunk) } else { chunk.clone() };
                    self.write(&text, 10.0, if i == 0 { 2.0 } else { 5.0 }, Font::Regular);
                }
            }
            Line::Gap => self.y -= 4.0,
        }
    }

    fn save(self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        self.doc
            .save(&mut BufWriter::new(file))
            .map_err(|e| anyhow!("write PDF: {:?}", e))?;
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Font {
    Regular,
    Bold,
    Mono,
}

/// Render into a per-call temporary directory and read the bytes back.
/// The directory and file are removed when this returns, on every path.
pub fn render_report(kind: ReportKind, snapshot: &AggregatedSnapshot) -> Result<RenderedReport> {
    let now = Local::now();
    let filename = report_filename(now);
    let dir = tempfile::Builder::new()
        .prefix("market_report")
        .tempdir()
        .context("create temporary directory")?;
    let path = dir.path().join(&filename);

    let mut writer = PageWriter::new(kind.title())?;
    for line in report_lines(kind, snapshot, now) {
        writer.line(&line);
    }
    let pages = writer.pages;
    writer.save(&path)?;

    let bytes = std::fs::read(&path).with_context(|| format!("read back {}", path.display()))?;
    log::info!("Rendered {} ({} pages, {} bytes)", filename, pages, bytes.len());
    Ok(RenderedReport { filename, bytes })
}
