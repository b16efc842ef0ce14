// ── Custom fonts ──────────────────────────────────────────────────────────────
//
// Fonts registered by the application at runtime.  A name maps either to a
// loaded face or to another name (alias); lookups follow alias chains.
//
// Faces are shared: the table holds one strong handle and the rasterizer's
// face cache holds another, so removing a font from the table does not free
// a face that a surface is still drawing with.

use std::{
    collections::{HashMap, HashSet},
    io::Read,
    rc::Rc,
};

use crate::error::{Result, WsError};

/// Container formats recognised by their leading tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontFormat {
    TrueType,
    OpenType,
    Collection,
}

impl FontFormat {
    fn sniff(data: &[u8]) -> Option<Self> {
        match data.get(..4)? {
            &[0x00, 0x01, 0x00, 0x00] | b"true" => Some(Self::TrueType),
            b"OTTO" => Some(Self::OpenType),
            b"ttcf" => Some(Self::Collection),
            _ => None,
        }
    }
}

/// A loaded font file.
#[derive(Debug)]
pub struct FontFace {
    name: String,
    format: FontFormat,
    data: Vec<u8>,
}

impl FontFace {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> FontFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

#[derive(Debug)]
enum FontEntry {
    Face(Rc<FontFace>),
    Alias(String),
}

/// Name → face or alias.
#[derive(Debug, Default)]
pub struct FontTable {
    fonts: HashMap<String, FontEntry>,
}

impl FontTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fonts.contains_key(name)
    }

    /// Read a whole font file from `reader` and register it as `name`.
    pub fn add<R: Read>(&mut self, name: &str, mut reader: R) -> Result<()> {
        if name.is_empty() {
            return Err(WsError::BadArguments);
        }
        if self.fonts.contains_key(name) {
            return Err(WsError::AlreadyExists);
        }

        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;

        let Some(format) = FontFormat::sniff(&data) else {
            log::error!("font '{name}': unrecognised font data ({} bytes)", data.len());
            return Err(WsError::BadArguments);
        };

        log::debug!("loaded font '{name}' ({format:?}, {} bytes)", data.len());
        let face = FontFace {
            name: name.to_owned(),
            format,
            data,
        };
        self.fonts
            .insert(name.to_owned(), FontEntry::Face(Rc::new(face)));
        Ok(())
    }

    /// Register `name` as another name for `alias`.  The target does not have
    /// to exist yet.
    pub fn add_alias(&mut self, name: &str, alias: &str) -> Result<()> {
        if name.is_empty() || alias.is_empty() {
            return Err(WsError::BadArguments);
        }
        if self.fonts.contains_key(name) {
            return Err(WsError::AlreadyExists);
        }
        self.fonts
            .insert(name.to_owned(), FontEntry::Alias(alias.to_owned()));
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<()> {
        self.fonts
            .remove(name)
            .map(|_| ())
            .ok_or(WsError::NotFound)
    }

    pub fn clear(&mut self) {
        self.fonts.clear();
    }

    /// Resolve `name`, following aliases.  A dangling or cyclic chain
    /// resolves to nothing.
    pub fn get(&self, name: &str) -> Option<Rc<FontFace>> {
        let mut visited = HashSet::new();
        let mut name = name;
        loop {
            if !visited.insert(name) {
                log::warn!("font alias cycle through '{name}'");
                return None;
            }
            match self.fonts.get(name)? {
                FontEntry::Face(face) => return Some(Rc::clone(face)),
                FontEntry::Alias(next) => name = next.as_str(),
            }
        }
    }
}

/// The rasterizer's side of face ownership: faces selected for drawing stay
/// alive here until the cache is flushed.
#[derive(Debug, Default)]
pub struct FaceCache {
    faces: HashMap<String, Rc<FontFace>>,
}

impl FaceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached face for `name`, resolving through `table` on a miss.
    pub fn face(&mut self, table: &FontTable, name: &str) -> Option<Rc<FontFace>> {
        if let Some(face) = self.faces.get(name) {
            return Some(Rc::clone(face));
        }
        let face = table.get(name)?;
        self.faces.insert(name.to_owned(), Rc::clone(&face));
        Some(face)
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn clear(&mut self) {
        self.faces.clear();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ttf() -> Vec<u8> {
        let mut v = vec![0x00, 0x01, 0x00, 0x00];
        v.extend_from_slice(&[0u8; 60]);
        v
    }

    #[test]
    fn add_and_lookup() {
        let mut t = FontTable::new();
        t.add("icons", ttf().as_slice()).unwrap();
        let f = t.get("icons").unwrap();
        assert_eq!(f.name(), "icons");
        assert_eq!(f.format(), FontFormat::TrueType);
        assert_eq!(f.data().len(), 64);
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut t = FontTable::new();
        t.add("a", ttf().as_slice()).unwrap();
        assert!(matches!(t.add("a", ttf().as_slice()), Err(WsError::AlreadyExists)));
        assert!(matches!(t.add_alias("a", "b"), Err(WsError::AlreadyExists)));
    }

    #[test]
    fn garbage_is_rejected() {
        let mut t = FontTable::new();
        assert!(matches!(
            t.add("junk", &b"not a font at all"[..]),
            Err(WsError::BadArguments)
        ));
        assert!(!t.contains("junk"));
    }

    #[test]
    fn alias_chain_is_followed() {
        let mut t = FontTable::new();
        t.add("base", ttf().as_slice()).unwrap();
        t.add_alias("mid", "base").unwrap();
        t.add_alias("top", "mid").unwrap();
        assert_eq!(t.get("top").unwrap().name(), "base");
    }

    #[test]
    fn dangling_and_cyclic_aliases_resolve_to_none() {
        let mut t = FontTable::new();
        t.add_alias("x", "missing").unwrap();
        assert!(t.get("x").is_none());
        t.add_alias("p", "q").unwrap();
        t.add_alias("q", "p").unwrap();
        assert!(t.get("p").is_none());
    }

    #[test]
    fn face_survives_removal_while_cached() {
        let mut t = FontTable::new();
        let mut cache = FaceCache::new();
        t.add("ui", ttf().as_slice()).unwrap();

        let face = cache.face(&t, "ui").unwrap();
        // table + cache + local
        assert_eq!(Rc::strong_count(&face), 3);

        t.remove("ui").unwrap();
        assert!(t.get("ui").is_none());
        assert_eq!(Rc::strong_count(&face), 2);
        assert!(cache.face(&t, "ui").is_some());

        cache.clear();
        assert_eq!(Rc::strong_count(&face), 1);
        assert!(matches!(t.remove("ui"), Err(WsError::NotFound)));
    }
}
