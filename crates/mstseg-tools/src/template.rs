//! Variable substitution for command templates.

use mstseg_common::UnitId;
use std::collections::HashMap;
use std::path::Path;

/// Variable substitution context for command templates.
///
/// Supports variable substitution in strings using the `{varname}` syntax.
/// Unknown variables are left untouched.
///
/// # Example
///
/// ```
/// use mstseg_common::UnitId;
/// use mstseg_tools::TemplateContext;
///
/// let unit = UnitId::from_filename("20180605_RR215.iso")?.to_bids();
/// let ctx = TemplateContext::new()
///     .with_unit(&unit)
///     .with_var("modality", "t1");
///
/// assert_eq!(ctx.substitute("{subject}_{session}"), "sub-RR215_ses-20180605");
/// assert_eq!(ctx.substitute("-p {participant}"), "-p RR215");
/// assert_eq!(ctx.substitute("{modality}"), "t1");
/// # Ok::<(), mstseg_common::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct TemplateContext {
    vars: HashMap<String, String>,
}

impl TemplateContext {
    /// Create a new empty template context.
    pub fn new() -> Self {
        Self {
            vars: HashMap::new(),
        }
    }

    /// Set unit-related variables.
    ///
    /// This adds the following variables:
    /// - `{subject}` - Subject id as carried by the cohort
    /// - `{session}` - Session id as carried by the cohort
    /// - `{participant}` - Subject label without the `sub-` prefix
    /// - `{session_label}` - Session label without the `ses-` prefix
    /// - `{unit}` - `<subject>_<session>`
    pub fn with_unit(mut self, unit: &UnitId) -> Self {
        self.set("subject", unit.subject.as_str());
        self.set("session", unit.session.as_str());
        self.set("participant", unit.subject.label());
        self.set("session_label", unit.session.label());
        self.set("unit", &unit.key());
        self
    }

    /// Add a path variable.
    pub fn with_path(mut self, key: &str, path: &Path) -> Self {
        self.set(key, &path.display().to_string());
        self
    }

    /// Add a custom variable.
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    /// Set a variable.
    pub fn set(&mut self, key: &str, value: &str) {
        self.vars.insert(key.to_string(), value.to_string());
    }

    /// Get a variable value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(|s| s.as_str())
    }

    /// Substitute variables in a string.
    ///
    /// Variables are in the form `{varname}`.
    pub fn substitute(&self, template: &str) -> String {
        let mut result = template.to_string();
        for (key, value) in &self.vars {
            result = result.replace(&format!("{{{}}}", key), value);
        }
        result
    }

    /// Substitute variables in a list of strings.
    pub fn substitute_all(&self, templates: &[String]) -> Vec<String> {
        templates.iter().map(|t| self.substitute(t)).collect()
    }
}

impl Default for TemplateContext {
    fn default() -> Self {
        Self::new()
    }
}
