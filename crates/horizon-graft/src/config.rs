//! Row list configuration.
//!
//! Every host-page detail the engine depends on (class names, selectors,
//! the reprocessing delay) is a field of [`RowListConfig`], so a layout
//! change on the host page is a configuration change rather than a code
//! change. Configuration can be built in code or loaded from TOML:
//!
//! ```
//! use horizon_graft::RowListConfig;
//! use std::time::Duration;
//!
//! let config = RowListConfig::from_toml_str(r#"
//!     selected_class = "selected"
//!     reprocess_delay_ms = 5
//!
//!     [toolbar]
//!     ancestor_depth = 4
//! "#).unwrap();
//!
//! assert_eq!(config.selected_class, "selected");
//! assert_eq!(config.reprocess_delay(), Duration::from_millis(5));
//! assert_eq!(config.toolbar.ancestor_depth, 4);
//! // Unset fields keep their defaults.
//! assert_eq!(config.identity_attribute, "id");
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Host-page layout knobs for a [`RowListDriver`](crate::RowListDriver).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RowListConfig {
    /// Selects the blocks under the row list element whose children are
    /// table sections.
    pub table_section_selector: String,
    /// Selects the row body inside a table section.
    pub row_body_selector: String,
    /// Prefix joined with a column selector to find columns to resize.
    pub column_scope: String,
    /// Attribute that gives a row its identity.
    pub identity_attribute: String,
    /// Class that opts a row out of processing.
    pub ignore_class: String,
    /// Class marking placeholder rows.
    pub placeholder_class: String,
    /// Class the host page sets on selected rows.
    pub selected_class: String,
    /// Class stamped on rows once a handle has been built for them.
    pub processed_class: String,
    /// A row is ready once it contains a match for this selector.
    /// `None` makes rows ready right away; in TOML it is written as an
    /// empty string.
    #[serde(with = "optional_selector")]
    pub row_ready_selector: Option<String>,
    /// Pause before re-processing a row that already carries modifications.
    pub reprocess_delay_ms: u64,
    /// Toolbar discovery.
    pub toolbar: ToolbarConfig,
}

impl Default for RowListConfig {
    fn default() -> Self {
        Self {
            table_section_selector: "div.Cp".to_string(),
            row_body_selector: "table > tbody".to_string(),
            column_scope: "table.cf > colgroup >".to_string(),
            identity_attribute: "id".to_string(),
            ignore_class: "graft__ignore_row".to_string(),
            placeholder_class: "bundle".to_string(),
            selected_class: "x7".to_string(),
            processed_class: "graft__thread_row".to_string(),
            row_ready_selector: Some("td".to_string()),
            reprocess_delay_ms: 2,
            toolbar: ToolbarConfig::default(),
        }
    }
}

/// Where to look for a row list's toolbar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolbarConfig {
    /// Selects the toolbar element itself.
    pub toolbar_selector: String,
    /// Selects document-wide toolbar containers for the fallback search.
    pub toolbar_container_selector: String,
    /// How far above the row list element the fallback search anchors.
    pub ancestor_depth: usize,
    /// Class stamped on the toolbar while it is bound.
    pub marker_class: String,
}

impl Default for ToolbarConfig {
    fn default() -> Self {
        Self {
            toolbar_selector: "[gh=mtb]".to_string(),
            toolbar_container_selector: "[gh=tm]".to_string(),
            ancestor_depth: 5,
            marker_class: "graft__toolbar".to_string(),
        }
    }
}

impl RowListConfig {
    /// Parse configuration from TOML text and validate it.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read configuration from a TOML file and validate it.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(target: "horizon_graft::row_list", path = %path.display(), "loaded row list config");
        Ok(config)
    }

    /// Check that every selector parses and required names are present.
    pub fn validate(&self) -> ConfigResult<()> {
        let selectors: [(&'static str, String); 5] = [
            ("table_section_selector", self.table_section_selector.clone()),
            ("row_body_selector", self.row_body_selector.clone()),
            ("column_scope", self.column_selector("col")),
            ("toolbar.toolbar_selector", self.toolbar.toolbar_selector.clone()),
            (
                "toolbar.toolbar_container_selector",
                self.toolbar.toolbar_container_selector.clone(),
            ),
        ];
        for (field, selector) in &selectors {
            check_selector(field, selector)?;
        }
        if let Some(ready) = &self.row_ready_selector {
            check_selector("row_ready_selector", ready)?;
        }

        for (field, value) in [
            ("identity_attribute", &self.identity_attribute),
            ("selected_class", &self.selected_class),
            ("processed_class", &self.processed_class),
        ] {
            if value.is_empty() {
                return Err(ConfigError::invalid_value(field, "must not be empty"));
            }
            // Class lists are matched token by token.
            if value.chars().any(char::is_whitespace) {
                return Err(ConfigError::invalid_value(
                    field,
                    "must be a single name without whitespace",
                ));
            }
        }
        Ok(())
    }

    /// The reprocessing pause as a [`Duration`].
    pub fn reprocess_delay(&self) -> Duration {
        Duration::from_millis(self.reprocess_delay_ms)
    }

    /// Full selector for columns matching `column` under [`column_scope`](Self::column_scope).
    pub fn column_selector(&self, column: &str) -> String {
        format!("{} {}", self.column_scope.trim_end(), column.trim())
    }
}

/// `Option<String>` as a plain string, with the empty string for `None`.
mod optional_selector {
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value.as_deref().unwrap_or(""))
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(if value.trim().is_empty() { None } else { Some(value) })
    }
}

fn check_selector(field: &'static str, selector: &str) -> ConfigResult<()> {
    horizon_graft_dom::selector::parse_selector_list(selector)
        .map(|_| ())
        .map_err(|source| ConfigError::InvalidSelector { field, source })
}
