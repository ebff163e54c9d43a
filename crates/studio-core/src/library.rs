//! Template library: user-editable diagram snippets grouped by category.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::OnceLock;

use crate::error::{Error, Result};

pub const LIBRARY_FORMAT_VERSION: u64 = 2;
pub const DEFAULT_TEMPLATE_TITLE: &str = "Untitled Template";
pub const DEFAULT_NEW_TEMPLATE_TITLE: &str = "New Template";
pub const DEFAULT_TEMPLATE_CATEGORY: &str = "Misc";
pub const DEFAULT_NEW_TEMPLATE_CODE: &str = "graph TD\n  A[Start] --> B[End]";
pub const DEFAULT_SOURCE_FILE: &str = "Custom";
/// Pseudo-category selecting every template; never stored.
pub const ALL_CATEGORIES: &str = "all";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSource {
    pub file: String,
    pub format: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub title: String,
    pub category: String,
    pub source: TemplateSource,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryCount {
    pub name: String,
    pub count: usize,
}

fn re_leading_title_punct() -> &'static Regex {
    static ONCE: OnceLock<Regex> = OnceLock::new();
    ONCE.get_or_init(|| Regex::new(r"^[\s:.-]+").unwrap())
}

fn re_id_invalid() -> &'static Regex {
    static ONCE: OnceLock<Regex> = OnceLock::new();
    ONCE.get_or_init(|| Regex::new(r"[^a-z0-9\-_]+").unwrap())
}

/// Strips leading whitespace, colons, dots and dashes (`"1. : Intro"` keeps `1`).
pub fn format_template_title(title: &str) -> String {
    re_leading_title_punct()
        .replace(title, "")
        .trim()
        .to_string()
}

/// Collapses whitespace runs to one space and trims.
pub fn normalize_category_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Unique (case-insensitively, first spelling wins), without `all`, sorted.
pub fn normalize_category_list<S: AsRef<str>>(
    categories: impl IntoIterator<Item = S>,
) -> Vec<String> {
    let mut unique: IndexMap<String, String> = IndexMap::new();
    for raw in categories {
        let name = normalize_category_name(raw.as_ref());
        if name.is_empty() || name.eq_ignore_ascii_case(ALL_CATEGORIES) {
            continue;
        }
        unique.entry(name.to_lowercase()).or_insert(name);
    }
    let mut out: Vec<String> = unique.into_values().collect();
    out.sort_by_key(|name| name.to_lowercase());
    out
}

/// Lowercases and replaces runs outside `[a-z0-9-_]` with `-`. `None` when nothing is left.
pub fn sanitize_template_id(value: &str) -> Option<String> {
    let lower = value.trim().to_lowercase();
    let cleaned = re_id_invalid().replace_all(&lower, "-");
    let cleaned = cleaned.trim_matches('-');
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Normalizes one persisted or imported template object. Non-objects yield `None`.
pub fn normalize_template(value: &Value, index: usize) -> Option<Template> {
    let obj = value.as_object()?;
    let title = non_empty_str(obj.get("title"))
        .or_else(|| non_empty_str(obj.get("name")))
        .map(format_template_title)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_TEMPLATE_TITLE.to_string());
    let category = non_empty_str(obj.get("category"))
        .map(normalize_category_name)
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| DEFAULT_TEMPLATE_CATEGORY.to_string());
    let source = obj.get("source");
    let file = non_empty_str(source.and_then(|s| s.get("file")))
        .or_else(|| non_empty_str(obj.get("sourceFile")))
        .unwrap_or(DEFAULT_SOURCE_FILE);
    let format = non_empty_str(source.and_then(|s| s.get("format")))
        .or_else(|| non_empty_str(obj.get("sourceFormat")))
        .unwrap_or("json");
    let id = non_empty_str(obj.get("id"))
        .and_then(sanitize_template_id)
        .or_else(|| sanitize_template_id(&title))
        .unwrap_or_else(|| format!("template-{index}"));
    let code = obj
        .get("code")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Some(Template {
        id,
        title,
        category,
        source: TemplateSource {
            file: file.to_string(),
            format: format.to_string(),
        },
        code,
    })
}

/// Normalizes a template list. A repeated id keeps its first position and its last value.
pub fn normalize_templates(values: &[Value]) -> Vec<Template> {
    let mut by_id: IndexMap<String, Template> = IndexMap::new();
    for (index, value) in values.iter().enumerate() {
        if let Some(template) = normalize_template(value, index) {
            by_id.insert(template.id.clone(), template);
        }
    }
    by_id.into_values().collect()
}

/// Accepts `{ "templates": [...], "categories": [...] }` or a bare template array.
fn parse_payload(value: &Value) -> Option<(Vec<Template>, Vec<String>)> {
    match value {
        Value::Array(items) => Some((normalize_templates(items), Vec::new())),
        Value::Object(obj) => {
            let templates = obj.get("templates")?.as_array()?;
            let categories = obj
                .get("categories")
                .and_then(Value::as_array)
                .map(|items| normalize_category_list(items.iter().filter_map(Value::as_str)))
                .unwrap_or_default();
            Some((normalize_templates(templates), categories))
        }
        _ => None,
    }
}

fn builtin(id: &str, title: &str, category: &str, code: &str) -> Template {
    Template {
        id: id.to_string(),
        title: title.to_string(),
        category: category.to_string(),
        source: TemplateSource {
            file: "Built-in".to_string(),
            format: "mermaid".to_string(),
        },
        code: code.to_string(),
    }
}

pub fn builtin_templates() -> Vec<Template> {
    vec![
        builtin(
            "flowchart-basic",
            "Basic Flowchart",
            "Flowchart",
            "graph TD\n  A[Start] --> B{Ready?}\n  B -->|Yes| C[Ship]\n  B -->|No| D[Fix]\n  D --> B",
        ),
        builtin(
            "sequence-login",
            "Login Sequence",
            "Sequence",
            "sequenceDiagram\n  participant U as User\n  participant S as Server\n  U->>S: credentials\n  S-->>U: session token",
        ),
        builtin(
            "class-shapes",
            "Shape Classes",
            "Class",
            "classDiagram\n  Shape <|-- Circle\n  Shape <|-- Square\n  Shape : +area() float",
        ),
        builtin(
            "state-traffic-light",
            "Traffic Light",
            "State",
            "stateDiagram-v2\n  [*] --> Red\n  Red --> Green\n  Green --> Yellow\n  Yellow --> Red",
        ),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateLibrary {
    path: Option<PathBuf>,
    templates: Vec<Template>,
    /// User-created categories, including empty ones.
    categories: Vec<String>,
}

impl Default for TemplateLibrary {
    fn default() -> Self {
        Self {
            path: None,
            templates: builtin_templates(),
            categories: Vec::new(),
        }
    }
}

impl TemplateLibrary {
    /// In-memory library seeded with the built-in templates.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the library persisted at `path`. A missing, corrupt or empty file yields the
    /// built-in templates; [`TemplateLibrary::persist`] will write to `path` either way.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut library = Self {
            path: Some(path.clone()),
            ..Self::default()
        };
        match read_payload(&path) {
            Ok(Some((templates, categories))) => {
                if !templates.is_empty() {
                    library.templates = templates;
                }
                library.categories = categories;
            }
            Ok(None) => {}
            Err(err) => tracing::warn!("failed to read template library, using built-ins: {err}"),
        }
        library
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn to_json(&self) -> Value {
        json!({
            "version": LIBRARY_FORMAT_VERSION,
            "templates": self.templates,
            "categories": self.categories,
        })
    }

    /// Writes the library to its path; a no-op for in-memory libraries.
    pub fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
            }
        }
        let text = serde_json::to_string(&self.to_json()).map_err(|e| Error::json(path, e))?;
        std::fs::write(path, text).map_err(|e| Error::io(path, e))
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    pub fn get(&self, id: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.id == id)
    }

    pub fn custom_categories(&self) -> &[String] {
        &self.categories
    }

    /// `all` first, then every category in use or created, sorted, with template counts.
    pub fn categories(&self) -> Vec<CategoryCount> {
        let mut counts: IndexMap<String, usize> = IndexMap::new();
        for template in &self.templates {
            let name = normalize_category_name(&template.category);
            let name = if name.is_empty() {
                DEFAULT_TEMPLATE_CATEGORY.to_string()
            } else {
                name
            };
            *counts.entry(name).or_default() += 1;
        }
        for category in &self.categories {
            counts.entry(category.clone()).or_default();
        }
        let mut sorted: Vec<CategoryCount> = counts
            .into_iter()
            .map(|(name, count)| CategoryCount { name, count })
            .collect();
        sorted.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));

        let mut out = vec![CategoryCount {
            name: ALL_CATEGORIES.to_string(),
            count: self.templates.len(),
        }];
        out.extend(sorted);
        out
    }

    pub fn category_exists(&self, name: &str) -> bool {
        let target = normalize_category_name(name).to_lowercase();
        !target.is_empty()
            && self
                .categories()
                .iter()
                .any(|c| c.name.to_lowercase() == target)
    }

    /// Creates an empty category. Returns the stored name, or `None` when the name is blank,
    /// reserved or already taken.
    pub fn add_category(&mut self, name: &str) -> Option<String> {
        let normalized = normalize_category_name(name);
        if normalized.is_empty()
            || normalized.eq_ignore_ascii_case(ALL_CATEGORIES)
            || self.category_exists(&normalized)
        {
            return None;
        }
        let mut next = self.categories.clone();
        next.push(normalized.clone());
        self.categories = normalize_category_list(next);
        Some(normalized)
    }

    /// Removes a created category; refused while any template still uses it.
    pub fn remove_category(&mut self, name: &str) -> bool {
        if self.templates.iter().any(|t| t.category == name) {
            return false;
        }
        let before = self.categories.len();
        self.categories.retain(|c| c != name);
        self.categories.len() != before
    }

    pub fn unique_id(&self, seed: &str) -> String {
        let base = sanitize_template_id(seed).unwrap_or_else(|| "template".to_string());
        let taken = |candidate: &str| self.templates.iter().any(|t| t.id == candidate);
        if !taken(&base) {
            return base;
        }
        let mut suffix = 2;
        while taken(&format!("{base}-{suffix}")) {
            suffix += 1;
        }
        format!("{base}-{suffix}")
    }

    pub fn unique_title(&self, base: &str) -> String {
        let base = Some(format_template_title(base))
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| DEFAULT_NEW_TEMPLATE_TITLE.to_string());
        let taken = |candidate: &str| {
            self.templates
                .iter()
                .any(|t| t.title.to_lowercase() == candidate.to_lowercase())
        };
        if !taken(&base) {
            return base;
        }
        let mut suffix = 2;
        while taken(&format!("{base} {suffix}")) {
            suffix += 1;
        }
        format!("{base} {suffix}")
    }

    /// Prepends a new template and returns it. Blank arguments take the defaults; the
    /// `all` pseudo-category maps to the default category.
    pub fn add(&mut self, title: &str, category: &str, code: &str) -> &Template {
        let title = self.unique_title(title);
        let id = self.unique_id(&title);
        let category = normalize_category_name(category);
        let category = if category.is_empty() || category.eq_ignore_ascii_case(ALL_CATEGORIES) {
            DEFAULT_TEMPLATE_CATEGORY.to_string()
        } else {
            category
        };
        let code = if code.trim().is_empty() {
            DEFAULT_NEW_TEMPLATE_CODE
        } else {
            code
        };
        self.templates.insert(
            0,
            Template {
                id,
                title,
                category,
                source: TemplateSource {
                    file: DEFAULT_SOURCE_FILE.to_string(),
                    format: "mermaid".to_string(),
                },
                code: code.to_string(),
            },
        );
        &self.templates[0]
    }

    /// Replaces a template's code. Returns `false` when the id is unknown.
    pub fn update_code(&mut self, id: &str, code: &str) -> bool {
        let Some(template) = self.templates.iter_mut().find(|t| t.id == id) else {
            return false;
        };
        template.code = code.to_string();
        if template.source.format.is_empty() {
            template.source.format = "mermaid".to_string();
        }
        true
    }

    pub fn rename(&mut self, id: &str, title: &str) -> bool {
        let title = format_template_title(title);
        if title.is_empty() {
            return false;
        }
        match self.templates.iter_mut().find(|t| t.id == id) {
            Some(template) => {
                template.title = title;
                true
            }
            None => false,
        }
    }

    pub fn set_category(&mut self, id: &str, category: &str) -> bool {
        let category = normalize_category_name(category);
        if category.is_empty() || category.eq_ignore_ascii_case(ALL_CATEGORIES) {
            return false;
        }
        match self.templates.iter_mut().find(|t| t.id == id) {
            Some(template) => {
                template.category = category;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<Template> {
        let index = self.templates.iter().position(|t| t.id == id)?;
        Some(self.templates.remove(index))
    }

    /// Case-insensitive search over title, category, code and source file, optionally
    /// restricted to one category (`all` or `None` for every category).
    pub fn search(&self, query: &str, category: Option<&str>) -> Vec<&Template> {
        let query = query.trim().to_lowercase();
        let category = category.filter(|c| *c != ALL_CATEGORIES);
        self.templates
            .iter()
            .filter(|t| category.is_none_or(|c| t.category == c))
            .filter(|t| {
                query.is_empty()
                    || [
                        format_template_title(&t.title).as_str(),
                        t.category.as_str(),
                        t.code.as_str(),
                        t.source.file.as_str(),
                    ]
                    .iter()
                    .any(|hay| hay.to_lowercase().contains(&query))
            })
            .collect()
    }

    /// Merges an imported payload (same shapes [`TemplateLibrary::load`] accepts); imported
    /// templates replace existing ones with the same id. Returns the number imported, or
    /// `None` when the payload has no template list.
    pub fn import(&mut self, payload: &Value) -> Option<usize> {
        let (incoming, categories) = parse_payload(payload)?;
        let imported = incoming.len();
        let mut by_id: IndexMap<String, Template> = self
            .templates
            .drain(..)
            .map(|t| (t.id.clone(), t))
            .collect();
        for template in incoming {
            by_id.insert(template.id.clone(), template);
        }
        self.templates = by_id.into_values().collect();
        let merged = self.categories.iter().cloned().chain(categories);
        self.categories = normalize_category_list(merged);
        Some(imported)
    }

    /// Backup document; `generated_on` is an RFC 3339 timestamp supplied by the caller.
    pub fn backup_json(&self, library_name: &str, generated_on: &str) -> Value {
        json!({
            "libraryName": library_name,
            "version": LIBRARY_FORMAT_VERSION,
            "generatedOn": generated_on,
            "totalTemplates": self.templates.len(),
            "categories": self.categories,
            "templates": self.templates,
        })
    }

    /// Restores the built-in templates and drops created categories.
    pub fn reset(&mut self) {
        self.templates = builtin_templates();
        self.categories.clear();
    }
}

fn read_payload(path: &Path) -> Result<Option<(Vec<Template>, Vec<String>)>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io(path, e)),
    };
    let value: Value = serde_json::from_str(&text).map_err(|e| Error::json(path, e))?;
    Ok(parse_payload(&value))
}
