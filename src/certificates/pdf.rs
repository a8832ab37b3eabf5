// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Minimal PDF 1.4 writer.
//!
//! Supports what a certificate needs: text in the standard Helvetica faces,
//! straight lines and rectangles. Text is encoded as WinAnsi, which covers
//! the Spanish alphabet; characters outside it are written as `?`.
//!
//! Output is a pure function of the drawing calls, with no timestamps or
//! random ids, so the same document always produces the same bytes.

use std::fmt::Write as _;

/// A4 landscape, in points.
pub const A4_LANDSCAPE: (f32, f32) = (842.0, 595.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Regular,
    Bold,
    Oblique,
}

impl Font {
    fn resource(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
            Font::Oblique => "F3",
        }
    }

    fn base_font(self) -> &'static str {
        match self {
            Font::Regular => "Helvetica",
            Font::Bold => "Helvetica-Bold",
            Font::Oblique => "Helvetica-Oblique",
        }
    }

    /// Rough average glyph width as a fraction of the font size.
    fn average_width(self) -> f32 {
        match self {
            Font::Bold => 0.56,
            Font::Regular | Font::Oblique => 0.5,
        }
    }

    const ALL: [Font; 3] = [Font::Regular, Font::Bold, Font::Oblique];
}

/// One page and its content stream.
#[derive(Debug, Clone)]
pub struct PdfPage {
    width: f32,
    height: f32,
    content: String,
}

impl PdfPage {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            content: String::new(),
        }
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    /// Draw text with its baseline starting at (`x`, `y`).
    pub fn text(&mut self, font: Font, size: f32, x: f32, y: f32, text: &str) {
        let _ = writeln!(
            self.content,
            "BT /{} {} Tf {} {} Td ({}) Tj ET",
            font.resource(),
            fmt_num(size),
            fmt_num(x),
            fmt_num(y),
            encode_text(text)
        );
    }

    /// Draw text horizontally centred on the page.
    pub fn centered_text(&mut self, font: Font, size: f32, y: f32, text: &str) {
        let estimated = text.chars().count() as f32 * size * font.average_width();
        let x = ((self.width - estimated) / 2.0).max(0.0);
        self.text(font, size, x, y, text);
    }

    pub fn line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, stroke_width: f32) {
        let _ = writeln!(
            self.content,
            "{} w {} {} m {} {} l S",
            fmt_num(stroke_width),
            fmt_num(x1),
            fmt_num(y1),
            fmt_num(x2),
            fmt_num(y2)
        );
    }

    pub fn rect(&mut self, x: f32, y: f32, width: f32, height: f32, stroke_width: f32) {
        let _ = writeln!(
            self.content,
            "{} w {} {} {} {} re S",
            fmt_num(stroke_width),
            fmt_num(x),
            fmt_num(y),
            fmt_num(width),
            fmt_num(height)
        );
    }
}

/// A document under construction.
#[derive(Debug, Clone, Default)]
pub struct PdfDocument {
    title: String,
    pages: Vec<PdfPage>,
}

impl PdfDocument {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            pages: Vec::new(),
        }
    }

    pub fn add_page(&mut self, page: PdfPage) {
        self.pages.push(page);
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Serialize to PDF bytes.
    ///
    /// Object layout: 1 catalog, 2 page tree, 3 info, then one object per
    /// font, then a (page, content) pair per page.
    pub fn to_bytes(&self) -> Vec<u8> {
        let font_base = 4;
        let page_base = font_base + Font::ALL.len();
        let page_ids: Vec<usize> = (0..self.pages.len()).map(|i| page_base + 2 * i).collect();

        let mut objects: Vec<String> = Vec::new();

        objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());

        let kids = page_ids
            .iter()
            .map(|id| format!("{id} 0 R"))
            .collect::<Vec<_>>()
            .join(" ");
        objects.push(format!(
            "<< /Type /Pages /Kids [{kids}] /Count {} >>",
            self.pages.len()
        ));

        objects.push(format!(
            "<< /Title ({}) /Producer (club-shares-server) >>",
            encode_text(&self.title)
        ));

        for font in Font::ALL {
            objects.push(format!(
                "<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>",
                font.base_font()
            ));
        }

        let font_resources = Font::ALL
            .iter()
            .enumerate()
            .map(|(i, font)| format!("/{} {} 0 R", font.resource(), font_base + i))
            .collect::<Vec<_>>()
            .join(" ");

        for (page, page_id) in self.pages.iter().zip(&page_ids) {
            objects.push(format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] \
                 /Resources << /Font << {font_resources} >> >> /Contents {} 0 R >>",
                fmt_num(page.width),
                fmt_num(page.height),
                page_id + 1
            ));
            objects.push(format!(
                "<< /Length {} >>\nstream\n{}endstream",
                page.content.len(),
                page.content
            ));
        }

        let mut out = String::from("%PDF-1.4\n");
        let mut offsets = Vec::with_capacity(objects.len());
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            let _ = write!(out, "{} 0 obj\n{body}\nendobj\n", i + 1);
        }

        let xref_offset = out.len();
        let _ = write!(out, "xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
        for offset in offsets {
            let _ = write!(out, "{offset:010} 00000 n \n");
        }
        let _ = write!(
            out,
            "trailer\n<< /Size {} /Root 1 0 R /Info 3 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
            objects.len() + 1
        );

        out.into_bytes()
    }
}

/// Encode a string as the body of a PDF literal string in WinAnsi.
///
/// The output is pure ASCII: bytes above 0x7E use octal escapes.
pub fn encode_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(ch);
            }
            ' '..='~' => out.push(ch),
            '\u{A0}'..='\u{FF}' => {
                let _ = write!(out, "\\{:03o}", ch as u32);
            }
            '\n' | '\t' => out.push(' '),
            _ => out.push('?'),
        }
    }
    out
}

fn fmt_num(value: f32) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{value:.2}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_delimiters_and_latin1() {
        assert_eq!(encode_text("a(b)c\\"), "a\\(b\\)c\\\\");
        assert_eq!(encode_text("Pérez"), "P\\351rez");
        assert_eq!(encode_text("ACCIÓN"), "ACCI\\323N");
        assert_eq!(encode_text("€"), "?");
    }

    #[test]
    fn document_structure_is_well_formed() {
        let mut page = PdfPage::new(A4_LANDSCAPE.0, A4_LANDSCAPE.1);
        page.text(Font::Bold, 24.0, 100.0, 500.0, "Certificado");
        page.rect(20.0, 20.0, 802.0, 555.0, 2.0);
        let mut doc = PdfDocument::new("Test");
        doc.add_page(page);

        let bytes = doc.to_bytes();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("%PDF-1.4\n"));
        assert!(text.ends_with("%%EOF\n"));
        assert!(text.contains("/BaseFont /Helvetica-Bold"));
        assert!(text.contains("(Certificado) Tj"));
        assert!(text.contains("/Count 1"));

        // xref offsets must point at object headers
        let xref_start: usize = text
            .rsplit("startxref\n")
            .next()
            .and_then(|tail| tail.lines().next())
            .unwrap()
            .parse()
            .unwrap();
        assert!(text[xref_start..].starts_with("xref"));
        let first_entry = text[xref_start..].lines().nth(3).unwrap();
        let offset: usize = first_entry[..10].parse().unwrap();
        assert!(text[offset..].starts_with("1 0 obj"));
    }

    #[test]
    fn output_is_deterministic() {
        let build = || {
            let mut page = PdfPage::new(A4_LANDSCAPE.0, A4_LANDSCAPE.1);
            page.centered_text(Font::Regular, 12.0, 300.0, "Acción 1");
            let mut doc = PdfDocument::new("Same");
            doc.add_page(page);
            doc.to_bytes()
        };
        assert_eq!(build(), build());
    }
}
