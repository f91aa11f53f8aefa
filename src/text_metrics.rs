use fontdb::{Database, Family, Query, Stretch, Style, Weight};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use ttf_parser::Face;

static SYSTEM_FONTS: Lazy<Database> = Lazy::new(|| {
    let mut db = Database::new();
    db.load_system_fonts();
    db
});

/// Advance used per character when no face is loaded or a glyph is missing,
/// as a fraction of the font size.
const FALLBACK_ADVANCE: f32 = 0.56;

/// Measures glyph runs from font advances.
///
/// Without a loaded face every character advances by a fixed fraction of
/// the font size, which keeps measurements deterministic on machines with
/// no system fonts.
#[derive(Debug, Default)]
pub struct TextMeasurer {
    face: Option<FontFace>,
}

impl TextMeasurer {
    pub fn fallback() -> Self {
        Self { face: None }
    }

    /// Resolve a CSS-like family list (`"Inter, sans-serif"`) against the
    /// system font database. Falls back to fixed advances if nothing matches.
    pub fn from_family(font_family: &str) -> Self {
        Self {
            face: load_face(&SYSTEM_FONTS, font_family),
        }
    }

    /// Use a font supplied as raw bytes (TTF/OTF).
    pub fn from_font_data(data: Vec<u8>, index: u32) -> Self {
        let face = Face::parse(&data, index)
            .ok()
            .map(|face| face.units_per_em().max(1))
            .map(|units_per_em| FontFace::new(data, index, units_per_em));
        Self { face }
    }

    pub fn has_face(&self) -> bool {
        self.face.is_some()
    }

    pub fn measure_width(&mut self, text: &str, font_size: f32) -> f32 {
        if text.is_empty() || font_size <= 0.0 {
            return 0.0;
        }
        let normalized = text.replace('\t', "    ");
        match self.face.as_mut() {
            Some(face) => face.measure_width(&normalized, font_size),
            None => {
                normalized.chars().filter(|ch| *ch != '\n').count() as f32
                    * font_size
                    * FALLBACK_ADVANCE
            }
        }
    }
}

fn load_face(db: &Database, font_family: &str) -> Option<FontFace> {
    #[derive(Clone, Copy)]
    enum FamilyToken {
        Generic(Family<'static>),
        Name(usize),
    }

    let mut names: Vec<String> = Vec::new();
    let mut order: Vec<FamilyToken> = Vec::new();
    for part in font_family.split(',') {
        let raw = part.trim().trim_matches('"').trim_matches('\'');
        if raw.is_empty() {
            continue;
        }
        match raw.to_ascii_lowercase().as_str() {
            "serif" => order.push(FamilyToken::Generic(Family::Serif)),
            "sans-serif" | "system-ui" => order.push(FamilyToken::Generic(Family::SansSerif)),
            "monospace" => order.push(FamilyToken::Generic(Family::Monospace)),
            _ => {
                order.push(FamilyToken::Name(names.len()));
                names.push(raw.to_string());
            }
        }
    }
    if order.is_empty() {
        order.push(FamilyToken::Generic(Family::SansSerif));
    }

    let families: Vec<Family<'_>> = order
        .iter()
        .map(|token| match *token {
            FamilyToken::Generic(family) => family,
            FamilyToken::Name(idx) => Family::Name(names[idx].as_str()),
        })
        .collect();

    let query = Query {
        families: &families,
        weight: Weight::NORMAL,
        stretch: Stretch::Normal,
        style: Style::Normal,
    };
    let id = db.query(&query)?;
    db.with_face_data(id, |data, index| {
        let units_per_em = Face::parse(data, index).ok()?.units_per_em().max(1);
        Some(FontFace::new(data.to_vec(), index, units_per_em))
    })
    .flatten()
}

#[derive(Debug)]
struct FontFace {
    data: Vec<u8>,
    index: u32,
    units_per_em: u16,
    ascii_advances: Option<[u16; 128]>,
    advance_cache: HashMap<char, Option<u16>>,
}

impl FontFace {
    fn new(data: Vec<u8>, index: u32, units_per_em: u16) -> Self {
        let ascii_advances = Face::parse(&data, index).ok().map(|parsed| {
            let mut advances = [0u16; 128];
            for byte in 0u8..=127 {
                if let Some(glyph_id) = parsed.glyph_index(byte as char) {
                    advances[byte as usize] = parsed.glyph_hor_advance(glyph_id).unwrap_or(0);
                }
            }
            advances
        });
        Self {
            data,
            index,
            units_per_em,
            ascii_advances,
            advance_cache: HashMap::new(),
        }
    }

    fn measure_width(&mut self, text: &str, font_size: f32) -> f32 {
        let scale = font_size / self.units_per_em as f32;
        let fallback = font_size * FALLBACK_ADVANCE;

        if text.is_ascii()
            && let Some(advances) = &self.ascii_advances
        {
            let mut width = 0.0f32;
            for byte in text.as_bytes() {
                if *byte == b'\n' {
                    continue;
                }
                let advance = advances[*byte as usize];
                width += if advance == 0 {
                    fallback
                } else {
                    advance as f32 * scale
                };
            }
            return width.max(0.0);
        }

        let face = Face::parse(&self.data, self.index).ok();
        let mut width = 0.0f32;
        for ch in text.chars() {
            if ch == '\n' {
                continue;
            }
            let advance = *self.advance_cache.entry(ch).or_insert_with(|| {
                let face = face.as_ref()?;
                let glyph = face.glyph_index(ch)?;
                face.glyph_hor_advance(glyph)
            });
            width += match advance {
                Some(value) if value > 0 => value as f32 * scale,
                _ => fallback,
            };
        }
        width.max(0.0)
    }
}
