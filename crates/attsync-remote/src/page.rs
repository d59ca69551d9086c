//! Gallery page renderer
//!
//! Classifies image assets by their file-name convention and renders the
//! Confluence storage-format page that previews them.
//!
//! ## File-name convention
//!
//! `{scene}_{type}_{name}_{state}[_{lang}]` where `scene` selects the
//! section (`free`, `loading`, anything else is `main`). Two kinds of assets
//! are grouped by their first four segments:
//!
//! - localized variants, whose fifth segment is a language code
//! - bitmap-font digits, whose `type` is `nu`
//!
//! Any name containing `layout` goes to the layout grid.
//!
//! Notes are looked up by file name for plain assets and by group name for
//! localized and bitmap-number groups.

use std::collections::BTreeMap;

use attsync_core::domain::{AssetKey, HistoryEntry, Notes};
use attsync_core::ports::{Categories, IDocumentRenderer, Section};

/// Language codes recognised in the fifth name segment
const LANG_CODES: &[&str] = &[
    "cn", "cm", "jp", "kr", "th", "id", "vn", "es", "pt", "tr", "mm", "bd", "en",
];

const IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg"];

const TOC_MACRO: &str = r#"<p><ac:structured-macro ac:name="toc" /></p>"#;

const HEADER_STYLE: &str = "background:#f1f3f5;";
const LABEL_STYLE: &str = "background:#f1f3f5; font-size:10px;";

// ============================================================================
// Classification
// ============================================================================

/// Game scene an asset belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scene {
    Main,
    Free,
    Loading,
}

impl Scene {
    fn from_segment(segment: &str) -> Self {
        match segment.to_ascii_lowercase().as_str() {
            "free" => Scene::Free,
            "loading" => Scene::Loading,
            _ => Scene::Main,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Scene::Main => "main",
            Scene::Free => "free",
            Scene::Loading => "loading",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Scene::Main => "Main Game",
            Scene::Free => "Free Game",
            Scene::Loading => "Loading",
        }
    }
}

/// Where an asset is shown on the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Layout,
    Plain(Scene),
    /// Localized variants grouped by base name
    Multi(Scene),
    /// Bitmap-font digits grouped by base name
    Nu(Scene),
}

impl Category {
    /// All categories in page order
    pub const ORDER: [Category; 10] = [
        Category::Layout,
        Category::Plain(Scene::Main),
        Category::Multi(Scene::Main),
        Category::Nu(Scene::Main),
        Category::Plain(Scene::Free),
        Category::Multi(Scene::Free),
        Category::Nu(Scene::Free),
        Category::Plain(Scene::Loading),
        Category::Multi(Scene::Loading),
        Category::Nu(Scene::Loading),
    ];

    /// Section id, e.g. `main`, `multi_free` or `nu_loading`
    pub fn id(self) -> String {
        match self {
            Category::Layout => "layout".to_string(),
            Category::Plain(scene) => scene.as_str().to_string(),
            Category::Multi(scene) => format!("multi_{}", scene.as_str()),
            Category::Nu(scene) => format!("nu_{}", scene.as_str()),
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ORDER.into_iter().find(|c| c.id() == id)
    }

    pub fn title(self) -> String {
        match self {
            Category::Layout => "Layout".to_string(),
            Category::Plain(scene) => scene.label().to_string(),
            Category::Multi(scene) => format!("{}: Localized", scene.label()),
            Category::Nu(scene) => format!("{}: Bitmap Numbers", scene.label()),
        }
    }
}

/// Name segments with the image extension removed
fn segments(name: &str) -> Vec<&str> {
    let lower = name.to_ascii_lowercase();
    let stem = IMAGE_EXTENSIONS
        .iter()
        .find(|ext| lower.ends_with(*ext))
        .map_or(name, |ext| &name[..name.len() - ext.len()]);
    stem.split('_').collect()
}

/// Classify one file name, returning its category and group key
///
/// The group key is the first four segments joined by `_` and is only set
/// for [`Category::Multi`] and [`Category::Nu`].
pub fn classify_name(name: &str) -> (Category, Option<String>) {
    if name.to_ascii_lowercase().contains("layout") {
        return (Category::Layout, None);
    }

    let parts = segments(name);
    let scene = Scene::from_segment(parts[0]);
    if parts.len() < 4 {
        return (Category::Plain(scene), None);
    }
    let group = || Some(parts[..4].join("_"));

    if parts.len() >= 5 && LANG_CODES.contains(&parts[4].to_ascii_lowercase().as_str()) {
        return (Category::Multi(scene), group());
    }

    if parts[1].eq_ignore_ascii_case("nu") {
        // A lone digit in the state slot means the state is missing
        let digit_state = parts[3].len() == 1 && parts[3].chars().all(|c| c.is_ascii_digit());
        if parts.len() < 5 && digit_state {
            return (Category::Plain(scene), None);
        }
        return (Category::Nu(scene), group());
    }

    (Category::Plain(scene), None)
}

// ============================================================================
// GalleryRenderer
// ============================================================================

/// [`IDocumentRenderer`] for image galleries following the naming convention
#[derive(Debug, Clone)]
pub struct GalleryRenderer {
    title: String,
}

impl GalleryRenderer {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }
}

impl IDocumentRenderer for GalleryRenderer {
    fn title(&self) -> String {
        self.title.clone()
    }

    fn classify(&self, keys: &[AssetKey]) -> Categories {
        let mut buckets: BTreeMap<String, Vec<AssetKey>> = BTreeMap::new();
        for key in keys {
            let (category, _) = classify_name(key.file_name());
            buckets.entry(category.id()).or_default().push(key.clone());
        }

        let mut categories = Categories::new();
        for category in Category::ORDER {
            if let Some(mut keys) = buckets.remove(&category.id()) {
                keys.sort_by(|a, b| a.file_name().cmp(b.file_name()).then_with(|| a.cmp(b)));
                categories.push(Section {
                    id: category.id(),
                    title: category.title(),
                    keys,
                });
            }
        }
        categories
    }

    fn render(&self, categories: &Categories, history: &[HistoryEntry], notes: &Notes) -> String {
        let mut out = String::from(TOC_MACRO);
        render_history(&mut out, history);

        for section in categories.sections() {
            if section.keys.is_empty() {
                continue;
            }
            match Category::from_id(&section.id) {
                Some(Category::Layout) => render_layout(&mut out, section),
                Some(Category::Multi(_)) => render_multi(&mut out, section, notes),
                Some(Category::Nu(_)) => render_nu(&mut out, section, notes),
                Some(Category::Plain(_)) | None => render_plain(&mut out, section, notes),
            }
        }
        out
    }
}

// ============================================================================
// Storage-format fragments
// ============================================================================

/// Escape text for XHTML element content and attribute values
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

fn image_tag(key: &AssetKey, width: u32) -> String {
    format!(
        r#"<ac:image ac:width="{width}"><ri:attachment ri:filename="{}" /></ac:image>"#,
        escape_xml(key.as_str())
    )
}

fn render_history(out: &mut String, history: &[HistoryEntry]) {
    if history.is_empty() {
        return;
    }
    out.push_str("<h2>Sync History</h2><table><thead><tr>");
    for header in ["Time", "Changes", "Trigger"] {
        out.push_str(&format!("<th style='{HEADER_STYLE}'>{header}</th>"));
    }
    out.push_str("</tr></thead><tbody>");
    for entry in history {
        out.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            escape_xml(&entry.describe()),
            escape_xml(&entry.reason),
        ));
    }
    out.push_str("</tbody></table>");
}

fn render_layout(out: &mut String, section: &Section) {
    out.push_str(&format!("<h2>{}</h2><table><tbody>", escape_xml(&section.title)));
    for chunk in section.keys.chunks(4) {
        out.push_str("<tr>");
        for key in chunk {
            out.push_str(&format!(
                "<td style='background:#f1f3f5; font-size:11px; font-weight:bold;'>{}</td>",
                escape_xml(key.file_name())
            ));
        }
        out.push_str("</tr><tr>");
        for key in chunk {
            out.push_str(&format!("<td>{}</td>", image_tag(key, 250)));
        }
        out.push_str("</tr>");
    }
    out.push_str("</tbody></table>");
}

fn render_plain(out: &mut String, section: &Section, notes: &Notes) {
    out.push_str(&format!(
        "<h2>{}</h2><table><thead><tr><th>Preview</th><th>Name</th><th>Notes</th></tr></thead><tbody>",
        escape_xml(&section.title)
    ));
    for key in &section.keys {
        out.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            image_tag(key, 120),
            escape_xml(key.as_str()),
            escape_xml(notes.get(key.file_name()).unwrap_or_default())
        ));
    }
    out.push_str("</tbody></table>");
}

/// Keys grouped by their four-segment base name
fn groups(section: &Section) -> BTreeMap<String, Vec<&AssetKey>> {
    let mut groups: BTreeMap<String, Vec<&AssetKey>> = BTreeMap::new();
    for key in &section.keys {
        let group = classify_name(key.file_name())
            .1
            .unwrap_or_else(|| key.file_name().to_string());
        groups.entry(group).or_default().push(key);
    }
    groups
}

fn render_multi(out: &mut String, section: &Section, notes: &Notes) {
    out.push_str(&format!("<h3>{}</h3>", escape_xml(&section.title)));
    for (group, keys) in groups(section) {
        out.push_str(&format!(
            r#"<p style="font-size: 16px; font-weight: bold; margin-top: 20px;">Group: {}_{{language}}</p>"#,
            escape_xml(&group)
        ));
        if let Some(note) = notes.get(&group) {
            out.push_str(&format!("<p>{}</p>", escape_xml(note)));
        }
        out.push_str("<table><tbody>");
        for chunk in keys.chunks(7) {
            out.push_str("<tr>");
            for key in chunk {
                let lang = segments(key.file_name())
                    .get(4)
                    .map(|s| s.to_ascii_uppercase())
                    .unwrap_or_default();
                out.push_str(&format!("<td style='{LABEL_STYLE}'>{}</td>", escape_xml(&lang)));
            }
            out.push_str("</tr><tr>");
            for key in chunk {
                out.push_str(&format!("<td>{}</td>", image_tag(key, 100)));
            }
            out.push_str("</tr>");
        }
        out.push_str("</tbody></table>");
    }
}

fn render_nu(out: &mut String, section: &Section, notes: &Notes) {
    out.push_str(&format!("<h3>{}</h3>", escape_xml(&section.title)));
    for (group, keys) in groups(section) {
        out.push_str(&format!(
            "<h4>Group: {}</h4><table><tbody><tr><th colspan='8' style='background:#fffde7; text-align:left;'>Notes: {}</th></tr>",
            escape_xml(&group),
            escape_xml(notes.get(&group).unwrap_or_default())
        ));
        for chunk in keys.chunks(8) {
            out.push_str("<tr>");
            for key in chunk {
                let label = segments(key.file_name()).last().copied().unwrap_or_default();
                out.push_str(&format!("<td style='{LABEL_STYLE}'>{}</td>", escape_xml(label)));
            }
            out.push_str("</tr><tr>");
            for key in chunk {
                out.push_str(&format!("<td>{}</td>", image_tag(key, 80)));
            }
            out.push_str("</tr>");
        }
        out.push_str("</tbody></table>");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> AssetKey {
        AssetKey::new(s.to_string()).unwrap()
    }

    fn ids(categories: &Categories) -> Vec<&str> {
        categories.sections().iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn test_classify_name_rules() {
        use Category::*;

        assert_eq!(classify_name("Main_Layout_v2.png").0, Layout);
        assert_eq!(classify_name("bg.png"), (Plain(Scene::Main), None));
        assert_eq!(classify_name("free_bg.png"), (Plain(Scene::Free), None));
        assert_eq!(
            classify_name("loading_btn_start_normal.png"),
            (Plain(Scene::Loading), None)
        );
        assert_eq!(
            classify_name("main_txt_win_normal_jp.png"),
            (Multi(Scene::Main), Some("main_txt_win_normal".to_string()))
        );
        assert_eq!(
            classify_name("free_nu_score_gold_7.png"),
            (Nu(Scene::Free), Some("free_nu_score_gold".to_string()))
        );
        // Digit in the state slot with no fifth segment
        assert_eq!(classify_name("main_nu_score_7.png"), (Plain(Scene::Main), None));
        assert_eq!(
            classify_name("main_nu_score_big.png"),
            (Nu(Scene::Main), Some("main_nu_score_big".to_string()))
        );
        // Language check wins over the nu type
        assert_eq!(classify_name("main_nu_a_b_EN.jpg").0, Multi(Scene::Main));
    }

    #[test]
    fn test_category_ids_round_trip() {
        for category in Category::ORDER {
            assert_eq!(Category::from_id(&category.id()), Some(category));
        }
        assert_eq!(Category::from_id("other"), None);
    }

    #[test]
    fn test_classify_orders_sections_and_keys() {
        let renderer = GalleryRenderer::new("Gallery");
        let keys = vec![
            key("loading_bg.png"),
            key("main_sym_b_normal.png"),
            key("layout.png"),
            key("main_sym_a_normal.png"),
            key("free_txt_win_normal_cn.png"),
        ];
        let categories = renderer.classify(&keys);

        assert_eq!(ids(&categories), vec!["layout", "main", "multi_free", "loading"]);
        let main: Vec<_> = categories.get("main").unwrap().keys.iter().map(|k| k.as_str()).collect();
        assert_eq!(main, vec!["main_sym_a_normal.png", "main_sym_b_normal.png"]);
        assert_eq!(categories.total(), keys.len());
        assert_eq!(categories.get("multi_free").unwrap().title, "Free Game: Localized");
    }

    #[test]
    fn test_classify_uses_file_name_of_nested_keys() {
        let renderer = GalleryRenderer::new("Gallery");
        let categories = renderer.classify(&[key("ui/free/free_bg.png")]);
        assert_eq!(ids(&categories), vec!["free"]);
    }

    #[test]
    fn test_render_structure() {
        let renderer = GalleryRenderer::new("Gallery");
        let categories = renderer.classify(&[
            key("layout_main.png"),
            key("main_bg.png"),
            key("main_txt_win_normal_cn.png"),
            key("main_txt_win_normal_en.png"),
            key("main_nu_score_gold_1.png"),
            key("main_nu_score_gold_2.png"),
        ]);
        let history = vec![HistoryEntry::now("startup", 6, 0, 0, 0)];
        let body = renderer.render(&categories, &history, &Notes::new());

        assert!(body.starts_with(TOC_MACRO));
        assert!(body.contains("<h2>Sync History</h2>"));
        assert!(body.contains("<td>added 6</td><td>startup</td>"));
        assert!(body.contains(
            r#"<ac:image ac:width="250"><ri:attachment ri:filename="layout_main.png" /></ac:image>"#
        ));
        assert!(body.contains(r#"ac:width="120"><ri:attachment ri:filename="main_bg.png""#));
        assert!(body.contains("Group: main_txt_win_normal_{language}"));
        assert!(body.contains("<td style='background:#f1f3f5; font-size:10px;'>CN</td>"));
        assert!(body.contains("<h4>Group: main_nu_score_gold</h4>"));
        assert!(body.contains("<td style='background:#f1f3f5; font-size:10px;'>2</td>"));

        // Page order follows the section order
        let layout = body.find("<h2>Layout</h2>").unwrap();
        let main = body.find("<h2>Main Game</h2>").unwrap();
        let multi = body.find("<h3>Main Game: Localized</h3>").unwrap();
        let nu = body.find("<h3>Main Game: Bitmap Numbers</h3>").unwrap();
        assert!(layout < main && main < multi && multi < nu);
    }

    #[test]
    fn test_render_history_newest_first_as_given() {
        let renderer = GalleryRenderer::new("Gallery");
        let history = vec![
            HistoryEntry::now("second", 0, 1, 0, 0),
            HistoryEntry::now("first", 1, 0, 0, 0),
        ];
        let body = renderer.render(&Categories::new(), &history, &Notes::new());
        assert!(body.find("second").unwrap() < body.find("first").unwrap());
    }

    #[test]
    fn test_render_without_history_or_assets() {
        let renderer = GalleryRenderer::new("Gallery");
        assert_eq!(renderer.render(&Categories::new(), &[], &Notes::new()), TOC_MACRO);
    }

    #[test]
    fn test_render_shows_notes() {
        let renderer = GalleryRenderer::new("Gallery");
        let categories = renderer.classify(&[
            key("main_bg.png"),
            key("main_sym_a_normal.png"),
            key("main_txt_win_normal_cn.png"),
            key("main_nu_score_gold_1.png"),
        ]);
        let mut notes = Notes::new();
        notes.insert("main_bg", "Base <game> background");
        notes.insert("main_txt_win_normal", "Big win banner");
        notes.insert("main_nu_score_gold", "Digits 0-9");
        let body = renderer.render(&categories, &[], &notes);

        assert!(body.contains("<th>Notes</th>"));
        assert!(body.contains("<td>main_bg.png</td><td>Base &lt;game&gt; background</td>"));
        assert!(body.contains("<td>main_sym_a_normal.png</td><td></td>"));
        assert!(body.contains("<p>Big win banner</p><table>"));
        assert!(body.contains("text-align:left;'>Notes: Digits 0-9</th>"));
    }

    #[test]
    fn test_render_escapes_text() {
        let renderer = GalleryRenderer::new("Gallery");
        let categories = renderer.classify(&[key("main_a&b.png")]);
        let history = vec![HistoryEntry::now("<watcher>", 1, 0, 0, 0)];
        let body = renderer.render(&categories, &history, &Notes::new());

        assert!(body.contains(r#"ri:filename="main_a&amp;b.png""#));
        assert!(body.contains("&lt;watcher&gt;"));
        assert!(!body.contains("<watcher>"));
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml(r#"a<b>&"c'"#), "a&lt;b&gt;&amp;&quot;c&apos;");
        assert_eq!(escape_xml("plain"), "plain");
    }
}
