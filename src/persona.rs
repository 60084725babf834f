//! Persona registry
//!
//! Personas are configured per tenant (handle, display name, system prompt,
//! proactivity, optional background knowledge for RAG) and resolved lazily,
//! mirroring the Python service's per-tenant persona cache in
//! `runtime_adapter.py` (`_load_persona_settings`/`_persona_cache`).

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// Background-knowledge configuration for a persona's RAG collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaBackground {
    pub content: Option<String>,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_true")]
    pub rag_enabled: bool,
    #[serde(default = "default_top_k")]
    pub rag_top_k: usize,
}

fn default_source() -> String {
    "background".to_string()
}
fn default_true() -> bool {
    true
}
fn default_top_k() -> usize {
    3
}

/// A single persona, scoped to the tenant it was loaded for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaProfile {
    pub handle: String,
    pub display_name: String,
    pub prompt: String,
    #[serde(default = "default_proactivity")]
    pub proactivity: f32,
    #[serde(default)]
    pub catchphrases: Vec<String>,
    pub background: Option<PersonaBackground>,
    /// Overrides the tenant/global effective memory window for this persona. `0` (the serde
    /// default) defers to the tenant/global default; `-1` means unbounded history.
    #[serde(default)]
    pub memory_window: i64,
}

fn default_proactivity() -> f32 {
    0.5
}

impl PersonaProfile {
    pub fn has_knowledge_base(&self) -> bool {
        self.background.as_ref().is_some_and(|b| b.rag_enabled)
    }

    /// The full system prompt handed to the runtime adapter: the configured prompt plus a
    /// catchphrase tail, mirroring `Persona.system_prompt()`.
    pub fn system_prompt(&self) -> String {
        if self.catchphrases.is_empty() {
            self.prompt.clone()
        } else {
            format!("{}\nCatchphrases: {}", self.prompt, self.catchphrases.join("; "))
        }
    }
}

/// A lightweight reference used by the scheduler and API layer, without the full prompt text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaRef {
    pub handle: String,
    pub display_name: String,
    pub proactivity: f32,
    pub has_knowledge_base: bool,
}

impl From<&PersonaProfile> for PersonaRef {
    fn from(p: &PersonaProfile) -> Self {
        PersonaRef {
            handle: p.handle.clone(),
            display_name: p.display_name.clone(),
            proactivity: p.proactivity,
            has_knowledge_base: p.has_knowledge_base(),
        }
    }
}

/// Settings for one tenant's persona roster, analogous to `PersonaSettings`.
#[derive(Debug, Clone, Deserialize)]
pub struct TenantPersonaConfig {
    pub personas: Vec<PersonaProfile>,
    #[serde(default)]
    pub max_agents_per_turn: Option<usize>,
    #[serde(default)]
    pub memory_window: Option<i64>,
}

/// Tenant-scoped persona roster registry.
///
/// Configuration is loaded once per tenant and cached, mirroring the
/// `_persona_cache` dict in `NemoRuntimeAdapter`. In this crate configuration
/// is supplied directly (hand-written JSON via [`PersonaRegistry::register_tenant`])
/// rather than parsed from a YAML file on disk, since the rest of the crate's
/// dependency stack carries no YAML parser.
pub struct PersonaRegistry {
    tenants: RwLock<HashMap<String, TenantPersonaConfig>>,
}

impl PersonaRegistry {
    pub fn new() -> Self {
        Self {
            tenants: RwLock::new(HashMap::new()),
        }
    }

    pub fn register_tenant(&self, tenant_id: &str, config: TenantPersonaConfig) {
        self.tenants.write().unwrap().insert(tenant_id.to_string(), config);
    }

    pub fn list_personas(&self, tenant_id: &str) -> Vec<PersonaRef> {
        self.tenants
            .read()
            .unwrap()
            .get(tenant_id)
            .map(|cfg| cfg.personas.iter().map(PersonaRef::from).collect())
            .unwrap_or_default()
    }

    pub fn get_profile(&self, tenant_id: &str, handle: &str) -> Option<PersonaProfile> {
        self.tenants
            .read()
            .unwrap()
            .get(tenant_id)?
            .personas
            .iter()
            .find(|p| p.handle == handle)
            .cloned()
    }

    pub fn max_agents_per_turn(&self, tenant_id: &str, default: usize) -> usize {
        self.tenants
            .read()
            .unwrap()
            .get(tenant_id)
            .and_then(|cfg| cfg.max_agents_per_turn)
            .unwrap_or(default)
    }

    pub fn memory_window(&self, tenant_id: &str, default: i64) -> i64 {
        self.tenants
            .read()
            .unwrap()
            .get(tenant_id)
            .and_then(|cfg| cfg.memory_window)
            .unwrap_or(default)
    }

    /// Resolve a message's `target_personas` (by handle or display name, case-insensitive) to a
    /// single persona, falling back to the first configured persona. Mirrors
    /// `NemoRuntimeAdapter._select_persona`.
    pub fn select_persona(&self, tenant_id: &str, target_personas: &[String]) -> Option<PersonaProfile> {
        let tenants = self.tenants.read().unwrap();
        let cfg = tenants.get(tenant_id)?;
        if cfg.personas.is_empty() {
            return None;
        }

        for target in target_personas {
            let key = target.to_lowercase();
            if let Some(p) = cfg
                .personas
                .iter()
                .find(|p| p.handle.to_lowercase() == key || p.display_name.to_lowercase() == key)
            {
                return Some(p.clone());
            }
        }

        Some(cfg.personas[0].clone())
    }
}

impl Default for PersonaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> TenantPersonaConfig {
        TenantPersonaConfig {
            personas: vec![
                PersonaProfile {
                    handle: "aria".to_string(),
                    display_name: "Aria".to_string(),
                    prompt: "You are Aria, a helpful analyst.".to_string(),
                    proactivity: 0.7,
                    catchphrases: vec!["Let's dig in.".to_string()],
                    background: Some(PersonaBackground {
                        content: None,
                        source: "background".to_string(),
                        rag_enabled: true,
                        rag_top_k: 3,
                    }),
                    memory_window: 0,
                },
                PersonaProfile {
                    handle: "milo".to_string(),
                    display_name: "Milo".to_string(),
                    prompt: "You are Milo, a skeptical reviewer.".to_string(),
                    proactivity: 0.3,
                    catchphrases: vec![],
                    background: None,
                    memory_window: 0,
                },
            ],
            max_agents_per_turn: Some(2),
            memory_window: Some(8),
        }
    }

    #[test]
    fn lists_personas_scoped_to_tenant() {
        let registry = PersonaRegistry::new();
        registry.register_tenant("acme", sample_config());

        assert_eq!(registry.list_personas("acme").len(), 2);
        assert!(registry.list_personas("other").is_empty());
    }

    #[test]
    fn select_persona_prefers_target_then_falls_back_to_first() {
        let registry = PersonaRegistry::new();
        registry.register_tenant("acme", sample_config());

        let chosen = registry.select_persona("acme", &["Milo".to_string()]).unwrap();
        assert_eq!(chosen.handle, "milo");

        let fallback = registry.select_persona("acme", &[]).unwrap();
        assert_eq!(fallback.handle, "aria");
    }

    #[test]
    fn has_knowledge_base_reflects_background_rag_flag() {
        let registry = PersonaRegistry::new();
        registry.register_tenant("acme", sample_config());

        let profile = registry.get_profile("acme", "aria").unwrap();
        assert!(profile.has_knowledge_base());

        let profile = registry.get_profile("acme", "milo").unwrap();
        assert!(!profile.has_knowledge_base());
    }
}
