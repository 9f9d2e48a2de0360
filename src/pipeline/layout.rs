//! Layout: place every block of a [`Document`] on one tall canvas.
//!
//! Pure and deterministic. Coordinates are in points, origin top-left, y
//! growing downwards. Text is measured with the Helvetica advance widths
//! that the renderer's standard fonts use, so wrapped lines fit the boxes
//! drawn around them.

use crate::pipeline::document::{
    BadgeTone, Block, DetailCard, Document, ReferenceCard, Rgb, INK, MUTED, ORANGE, RULE, SUBTLE,
};

/// Inner padding of the canvas on every side.
pub const CANVAS_PADDING: f32 = 40.0;

const LINE_HEIGHT: f32 = 1.45;

/// One of the three standard faces the renderer embeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    Regular,
    Bold,
    Italic,
}

/// A primitive for the renderer.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Rect {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        fill: Option<Rgb>,
        stroke: Option<Rgb>,
    },
    Text {
        x: f32,
        /// Baseline, measured from the top of the canvas.
        baseline: f32,
        text: String,
        face: Face,
        size: f32,
        color: Rgb,
    },
}

impl DrawOp {
    /// Vertical extent `(top, bottom)` of the op.
    pub fn vertical_span(&self) -> (f32, f32) {
        match self {
            DrawOp::Rect { y, h, .. } => (*y, y + h),
            DrawOp::Text { baseline, size, .. } => (baseline - size, baseline + size * 0.25),
        }
    }
}

/// Placed document.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub width: f32,
    pub height: f32,
    pub ops: Vec<DrawOp>,
}

// ── Metrics ───────────────────────────────────────────────────────────────

/// Helvetica advance widths for ASCII 32..=126, in 1/1000 em.
#[rustfmt::skip]
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

/// Helvetica-Bold advance widths for ASCII 32..=126, in 1/1000 em.
#[rustfmt::skip]
const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

fn advance(c: char, face: Face) -> u16 {
    let table = match face {
        Face::Bold => &HELVETICA_BOLD,
        Face::Regular | Face::Italic => &HELVETICA,
    };
    match c as u32 {
        cp @ 32..=126 => table[(cp - 32) as usize],
        _ => 556,
    }
}

/// Width of `text` set in `face` at `size` points.
pub fn text_width(text: &str, face: Face, size: f32) -> f32 {
    let units: u32 = text.chars().map(|c| advance(c, face) as u32).sum();
    units as f32 * size / 1000.0
}

/// Map text onto what the standard fonts can show.
///
/// Typographic punctuation becomes its ASCII form; anything outside
/// Latin-1 becomes `?`.
pub fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => out.push('\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => out.push('"'),
            '\u{2010}'..='\u{2015}' | '\u{2212}' => out.push('-'),
            '\u{2026}' => out.push_str("..."),
            '\u{2022}' | '\u{00B7}' => out.push('*'),
            '\t' | '\u{00A0}' | '\u{2000}'..='\u{200B}' => out.push(' '),
            '\n' => out.push('\n'),
            c if c.is_control() => {}
            c if (c as u32) < 0x100 => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

/// Greedy word wrap. Explicit `\n` forces a break; words wider than
/// `max_width` are split between characters.
pub fn wrap(text: &str, face: Face, size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let space = text_width(" ", face, size);

    for hard_line in sanitize(text).split('\n') {
        let mut current = String::new();
        let mut current_w = 0.0;

        for word in hard_line.split_whitespace() {
            let word_w = text_width(word, face, size);

            if word_w > max_width {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                    current_w = 0.0;
                }
                for c in word.chars() {
                    let cw = text_width(c.encode_utf8(&mut [0; 4]), face, size);
                    if current_w + cw > max_width && !current.is_empty() {
                        lines.push(std::mem::take(&mut current));
                        current_w = 0.0;
                    }
                    current.push(c);
                    current_w += cw;
                }
                continue;
            }

            let needed = if current.is_empty() { word_w } else { current_w + space + word_w };
            if needed > max_width && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                current_w = 0.0;
            }
            if !current.is_empty() {
                current.push(' ');
                current_w += space;
            }
            current.push_str(word);
            current_w += word_w;
        }

        if !current.is_empty() {
            lines.push(current);
        }
    }

    lines
}

/// Single line shortened with `...` to fit `max_width`.
fn fit(text: &str, face: Face, size: f32, max_width: f32) -> String {
    let clean = sanitize(text).replace('\n', " ");
    if text_width(&clean, face, size) <= max_width {
        return clean;
    }
    let budget = max_width - text_width("...", face, size);
    let mut out = String::new();
    let mut w = 0.0;
    for c in clean.chars() {
        let cw = text_width(c.encode_utf8(&mut [0; 4]), face, size);
        if w + cw > budget {
            break;
        }
        out.push(c);
        w += cw;
    }
    out.push_str("...");
    out
}

fn line_height(size: f32) -> f32 {
    size * LINE_HEIGHT
}

// ── Placement ─────────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum Align {
    Left,
    Center,
    Right,
}

struct Painter {
    width: f32,
    y: f32,
    ops: Vec<DrawOp>,
}

impl Painter {
    fn left(&self) -> f32 {
        CANVAS_PADDING
    }

    fn content_width(&self) -> f32 {
        self.width - 2.0 * CANVAS_PADDING
    }

    fn rect(&mut self, x: f32, y: f32, w: f32, h: f32, fill: Option<Rgb>, stroke: Option<Rgb>) {
        self.ops.push(DrawOp::Rect { x, y, w, h, fill, stroke });
    }

    /// Emit pre-wrapped lines in a box `[x, x + w)` starting at `top`.
    /// Returns the height used.
    #[allow(clippy::too_many_arguments)]
    fn lines(
        &mut self,
        lines: &[String],
        x: f32,
        w: f32,
        top: f32,
        face: Face,
        size: f32,
        color: Rgb,
        align: Align,
    ) -> f32 {
        let lh = line_height(size);
        for (i, line) in lines.iter().enumerate() {
            let lw = text_width(line, face, size);
            let lx = match align {
                Align::Left => x,
                Align::Center => x + (w - lw).max(0.0) / 2.0,
                Align::Right => x + (w - lw).max(0.0),
            };
            self.ops.push(DrawOp::Text {
                x: lx,
                baseline: top + i as f32 * lh + lh * 0.5 + size * 0.35,
                text: line.clone(),
                face,
                size,
                color,
            });
        }
        lines.len() as f32 * lh
    }

    /// Wrap and emit `text`. Returns the height used.
    #[allow(clippy::too_many_arguments)]
    fn text(
        &mut self,
        text: &str,
        x: f32,
        w: f32,
        top: f32,
        face: Face,
        size: f32,
        color: Rgb,
        align: Align,
    ) -> f32 {
        let lines = wrap(text, face, size, w);
        self.lines(&lines, x, w, top, face, size, color, align)
    }

    fn block(&mut self, block: &Block) {
        match block {
            Block::Header {
                title,
                subtitle,
                generated_on,
                accent,
            } => self.header(title, subtitle, generated_on, *accent),
            Block::Metadata(rows) => self.metadata(rows),
            Block::Summary { heading, body } => self.summary(heading, body),
            Block::SectionTitle(title) => self.section_title(title),
            Block::Stats(tiles) => self.stats(tiles),
            Block::DetailCards(cards) => self.detail_cards(cards),
            Block::Badges { heading, tone, items } => self.badges(heading, *tone, items),
            Block::Paragraphs(paragraphs) => self.paragraphs(paragraphs),
            Block::NumberedList(items) => self.numbered(items),
            Block::References { intro, cards, note } => self.references(intro, cards, note),
            Block::Disclaimer(text) => self.disclaimer(text),
            Block::Footer(lines) => self.footer(lines),
        }
    }

    fn header(&mut self, title: &str, subtitle: &str, generated_on: &str, accent: Rgb) {
        let (x, w) = (self.left(), self.content_width());
        let used = self.text(title, x, w, self.y, Face::Bold, 24.0, INK, Align::Center);
        self.y += used;
        self.y += 6.0;
        let used = self.text(subtitle, x, w, self.y, Face::Regular, 10.0, MUTED, Align::Center);
        self.y += used;
        let used = self.text(generated_on, x, w, self.y, Face::Regular, 10.0, MUTED, Align::Center);
        self.y += used;
        self.y += 14.0;
        self.rect(x, self.y, w, 3.0, Some(accent), None);
        self.y += 3.0 + 24.0;
    }

    fn metadata(&mut self, rows: &[(String, String)]) {
        const PAD: f32 = 12.0;
        const ROW: f32 = 20.0;
        const GAP: f32 = 24.0;
        let (x, w) = (self.left(), self.content_width());
        let col_w = (w - 2.0 * PAD - GAP) / 2.0;
        let row_count = rows.len().div_ceil(2);
        let h = 2.0 * PAD + row_count as f32 * ROW;

        self.rect(x, self.y, w, h, Some(Rgb::hex(0xf9fafb)), None);
        for (i, (label, value)) in rows.iter().enumerate() {
            let cx = x + PAD + (i % 2) as f32 * (col_w + GAP);
            let top = self.y + PAD + (i / 2) as f32 * ROW;
            let label_w = text_width(label, Face::Bold, 10.0) + 8.0;
            let label = fit(label, Face::Bold, 10.0, col_w);
            let value = fit(value, Face::Regular, 10.0, (col_w - label_w).max(10.0));
            self.lines(&[label], cx, col_w, top, Face::Bold, 10.0, Rgb::hex(0x4b5563), Align::Left);
            self.lines(&[value], cx, col_w, top, Face::Regular, 10.0, MUTED, Align::Right);
        }
        self.y += h + 16.0;
    }

    fn summary(&mut self, heading: &str, body: &str) {
        const PAD: f32 = 14.0;
        const BAR: f32 = 4.0;
        let (x, w) = (self.left(), self.content_width());
        let inner_x = x + BAR + PAD;
        let inner_w = w - BAR - 2.0 * PAD;

        let heading_lines = wrap(heading, Face::Bold, 12.0, inner_w);
        let body_lines = wrap(body, Face::Regular, 11.0, inner_w);
        let h = 2.0 * PAD
            + heading_lines.len() as f32 * line_height(12.0)
            + 6.0
            + body_lines.len() as f32 * line_height(11.0);

        self.rect(x, self.y, w, h, Some(Rgb::hex(0xfef3c7)), None);
        self.rect(x, self.y, BAR, h, Some(ORANGE), None);
        let mut top = self.y + PAD;
        top += self.lines(&heading_lines, inner_x, inner_w, top, Face::Bold, 12.0, Rgb::hex(0x92400e), Align::Left);
        top += 6.0;
        self.lines(&body_lines, inner_x, inner_w, top, Face::Regular, 11.0, Rgb::hex(0x78350f), Align::Left);
        self.y += h + 20.0;
    }

    fn section_title(&mut self, title: &str) {
        let (x, w) = (self.left(), self.content_width());
        self.y += 6.0;
        let used = self.text(title, x, w, self.y, Face::Bold, 15.0, INK, Align::Left);
        self.y += used;
        self.y += 6.0;
        self.rect(x, self.y, w, 2.0, Some(RULE), None);
        self.y += 2.0 + 12.0;
    }

    fn stats(&mut self, tiles: &[(String, String)]) {
        const GAP: f32 = 10.0;
        const TILE_H: f32 = 56.0;
        let (x, w) = (self.left(), self.content_width());
        let tile_w = (w - 2.0 * GAP) / 3.0;

        for (row, chunk) in tiles.chunks(3).enumerate() {
            let top = self.y + row as f32 * (TILE_H + GAP);
            for (i, (value, caption)) in chunk.iter().enumerate() {
                let tx = x + i as f32 * (tile_w + GAP);
                self.rect(tx, top, tile_w, TILE_H, Some(Rgb::hex(0xf3f4f6)), None);
                let value = fit(value, Face::Bold, 16.0, tile_w - 12.0);
                let caption = fit(caption, Face::Regular, 10.0, tile_w - 12.0);
                self.lines(&[value], tx, tile_w, top + 8.0, Face::Bold, 16.0, ORANGE, Align::Center);
                self.lines(&[caption], tx, tile_w, top + 34.0, Face::Regular, 10.0, MUTED, Align::Center);
            }
        }
        let rows = tiles.len().div_ceil(3) as f32;
        self.y += rows * TILE_H + (rows - 1.0).max(0.0) * GAP + 16.0;
    }

    fn detail_cards(&mut self, cards: &[DetailCard]) {
        const PAD: f32 = 10.0;
        let (x, w) = (self.left(), self.content_width());
        let inner_w = w - 2.0 * PAD;

        for card in cards {
            let heading = wrap(&card.heading, Face::Bold, 11.0, inner_w);
            let body: Vec<String> = card
                .lines
                .iter()
                .flat_map(|l| wrap(l, Face::Regular, 10.0, inner_w))
                .collect();
            let caution = card
                .caution
                .as_deref()
                .map(|c| wrap(&format!("Caution: {c}"), Face::Regular, 10.0, inner_w))
                .unwrap_or_default();

            let h = 2.0 * PAD
                + heading.len() as f32 * line_height(11.0)
                + 4.0
                + (body.len() + caution.len()) as f32 * line_height(10.0);

            self.rect(x, self.y, w, h, Some(Rgb::hex(0xf9fafb)), Some(RULE));
            let mut top = self.y + PAD;
            top += self.lines(&heading, x + PAD, inner_w, top, Face::Bold, 11.0, INK, Align::Left);
            top += 4.0;
            top += self.lines(&body, x + PAD, inner_w, top, Face::Regular, 10.0, Rgb::hex(0x374151), Align::Left);
            self.lines(&caution, x + PAD, inner_w, top, Face::Regular, 10.0, Rgb::hex(0xb45309), Align::Left);
            self.y += h + 8.0;
        }
        self.y += 8.0;
    }

    fn badges(&mut self, heading: &str, tone: BadgeTone, items: &[String]) {
        const PAD_X: f32 = 10.0;
        const PAD_Y: f32 = 5.0;
        const GAP: f32 = 6.0;
        const SIZE: f32 = 9.5;
        let (x, w) = (self.left(), self.content_width());
        let (bg, fg, border) = tone.colours();

        let used = self.text(heading, x, w, self.y, Face::Bold, 11.0, Rgb::hex(0x374151), Align::Left);

        self.y += used;
        self.y += 6.0;

        let mut cx = x;
        let mut row_h: f32 = 0.0;
        for item in items {
            let lines = wrap(item, Face::Regular, SIZE, w - 2.0 * PAD_X);
            if lines.is_empty() {
                continue;
            }
            let text_w = lines
                .iter()
                .map(|l| text_width(l, Face::Regular, SIZE))
                .fold(0.0, f32::max);
            let chip_w = text_w + 2.0 * PAD_X;
            let chip_h = lines.len() as f32 * line_height(SIZE) + 2.0 * PAD_Y;

            if cx > x && cx + chip_w > x + w {
                self.y += row_h + GAP;
                cx = x;
                row_h = 0.0;
            }
            self.rect(cx, self.y, chip_w, chip_h, Some(bg), Some(border));
            self.lines(&lines, cx + PAD_X, text_w, self.y + PAD_Y, Face::Regular, SIZE, fg, Align::Left);
            cx += chip_w + GAP;
            row_h = row_h.max(chip_h);
        }
        self.y += row_h + 14.0;
    }

    fn paragraphs(&mut self, paragraphs: &[String]) {
        const PAD: f32 = 14.0;
        const SIZE: f32 = 10.5;
        const GAP: f32 = 8.0;
        let (x, w) = (self.left(), self.content_width());
        let inner_w = w - 2.0 * PAD;

        let wrapped: Vec<Vec<String>> = paragraphs
            .iter()
            .map(|p| wrap(p, Face::Regular, SIZE, inner_w))
            .collect();
        let text_h: f32 = wrapped
            .iter()
            .map(|l| l.len() as f32 * line_height(SIZE))
            .sum::<f32>()
            + GAP * wrapped.len().saturating_sub(1) as f32;
        let h = 2.0 * PAD + text_h;

        self.rect(x, self.y, w, h, Some(Rgb::hex(0xf9fafb)), Some(RULE));
        let mut top = self.y + PAD;
        for lines in &wrapped {
            top += self.lines(lines, x + PAD, inner_w, top, Face::Regular, SIZE, INK, Align::Left);
            top += GAP;
        }
        self.y += h + 20.0;
    }

    fn numbered(&mut self, items: &[String]) {
        const PAD: f32 = 14.0;
        const BAR: f32 = 4.0;
        const INDENT: f32 = 22.0;
        const SIZE: f32 = 10.5;
        const GAP: f32 = 6.0;
        let (x, w) = (self.left(), self.content_width());
        let num_x = x + BAR + PAD;
        let text_x = num_x + INDENT;
        let text_w = w - BAR - 2.0 * PAD - INDENT;
        let green = Rgb::hex(0x166534);

        let wrapped: Vec<Vec<String>> = items
            .iter()
            .map(|i| wrap(i, Face::Regular, SIZE, text_w))
            .collect();
        let h = 2.0 * PAD
            + wrapped
                .iter()
                .map(|l| l.len().max(1) as f32 * line_height(SIZE))
                .sum::<f32>()
            + GAP * wrapped.len().saturating_sub(1) as f32;

        self.rect(x, self.y, w, h, Some(Rgb::hex(0xf0fdf4)), None);
        self.rect(x, self.y, BAR, h, Some(Rgb::hex(0x22c55e)), None);
        let mut top = self.y + PAD;
        for (n, lines) in wrapped.iter().enumerate() {
            self.lines(&[format!("{}.", n + 1)], num_x, INDENT, top, Face::Bold, SIZE, green, Align::Left);
            self.lines(lines, text_x, text_w, top, Face::Regular, SIZE, green, Align::Left);
            top += lines.len().max(1) as f32 * line_height(SIZE) + GAP;
        }
        self.y += h + 20.0;
    }

    fn references(&mut self, intro: &str, cards: &[ReferenceCard], note: &str) {
        const PAD: f32 = 10.0;
        let (x, w) = (self.left(), self.content_width());
        let inner_w = w - 2.0 * PAD;

        let used = self.text(intro, x, w, self.y, Face::Regular, 10.0, MUTED, Align::Left);

        self.y += used;
        self.y += 8.0;

        for card in cards {
            let relevance_w = text_width(&card.relevance, Face::Regular, 9.5);
            let pages = fit(&card.pages, Face::Bold, 10.0, inner_w - relevance_w - 12.0);
            let preview = wrap(&card.preview, Face::Italic, 9.5, inner_w);
            let h = 2.0 * PAD + line_height(10.0) + 4.0 + preview.len() as f32 * line_height(9.5);

            self.rect(x, self.y, w, h, Some(Rgb::hex(0xeff6ff)), Some(Rgb::hex(0xbfdbfe)));
            let top = self.y + PAD;
            self.lines(&[pages], x + PAD, inner_w, top, Face::Bold, 10.0, Rgb::hex(0x1e40af), Align::Left);
            self.lines(
                &[card.relevance.clone()],
                x + PAD,
                inner_w,
                top,
                Face::Regular,
                9.5,
                Rgb::hex(0x3b82f6),
                Align::Right,
            );
            let top = top + line_height(10.0) + 4.0;
            self.lines(&preview, x + PAD, inner_w, top, Face::Italic, 9.5, Rgb::hex(0x374151), Align::Left);
            self.y += h + 8.0;
        }

        let used = self.text(note, x, w, self.y, Face::Regular, 9.0, MUTED, Align::Left);

        self.y += used;
        self.y += 20.0;
    }

    fn disclaimer(&mut self, text: &str) {
        const PAD: f32 = 14.0;
        let (x, w) = (self.left(), self.content_width());
        let lines = wrap(text, Face::Italic, 10.0, w - 2.0 * PAD);
        let h = 2.0 * PAD + lines.len() as f32 * line_height(10.0);

        self.rect(x, self.y, w, h, Some(Rgb::hex(0xf3f4f6)), Some(Rgb::hex(0xd1d5db)));
        self.lines(&lines, x + PAD, w - 2.0 * PAD, self.y + PAD, Face::Italic, 10.0, Rgb::hex(0x4b5563), Align::Left);
        self.y += h + 20.0;
    }

    fn footer(&mut self, lines: &[String]) {
        let (x, w) = (self.left(), self.content_width());
        self.y += 10.0;
        self.rect(x, self.y, w, 1.0, Some(RULE), None);
        self.y += 1.0 + 12.0;
        for line in lines {
            let used = self.text(line, x, w, self.y, Face::Regular, 8.5, SUBTLE, Align::Center);
            self.y += used;
        }
    }
}

/// Lay out `doc` on a canvas `width` points wide.
pub fn layout_document(doc: &Document, width: f32) -> Layout {
    let mut painter = Painter {
        width,
        y: CANVAS_PADDING,
        ops: Vec::with_capacity(256),
    };
    for block in &doc.blocks {
        painter.block(block);
    }
    Layout {
        width,
        height: (painter.y + CANVAS_PADDING).ceil(),
        ops: painter.ops,
    }
}
