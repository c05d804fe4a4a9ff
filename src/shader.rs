//! Template-based WGSL composition: merges a base shader with zero or more
//! providers' function/dispatch code through a fixed set of placeholder markers,
//! recompiling lazily when a provider reports itself dirty.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, Result};

pub const FUNCTIONS_PLACEHOLDER: &str = "// FUNCTIONS_PLACEHOLDER";
pub const DISPATCH_PLACEHOLDER: &str = "// DISPATCH_PLACEHOLDER";
pub const PRE_EFFECT_FUNCTIONS_PLACEHOLDER: &str = "// PRE_EFFECT_FUNCTIONS_PLACEHOLDER";
pub const PRE_EFFECT_APPLY_PLACEHOLDER: &str = "// PRE_EFFECT_APPLY_PLACEHOLDER";
pub const POST_EFFECT_FUNCTIONS_PLACEHOLDER: &str = "// POST_EFFECT_FUNCTIONS_PLACEHOLDER";
pub const POST_EFFECT_APPLY_PLACEHOLDER: &str = "// POST_EFFECT_APPLY_PLACEHOLDER";

/// Implemented by anything that contributes WGSL code to the merged shader — a
/// widget's custom fragment effect, a pre/post-processing pass, …
pub trait ShaderProvider {
    /// Function definitions this provider contributes, inserted at
    /// [`FUNCTIONS_PLACEHOLDER`].
    fn code(&self) -> String;

    /// The dispatch expression this provider contributes, inserted (joined with
    /// `else`) at [`DISPATCH_PLACEHOLDER`]. Empty string contributes nothing.
    fn dispatch_code(&self) -> String {
        String::new()
    }

    /// How many WGSL functions this provider's [`Self::code`] defines. Tracked by
    /// the provider itself rather than parsed out of `code()`, since a provider
    /// knows its own contribution shape exactly.
    fn function_count(&self) -> usize;

    /// Whether this provider's contributed code has changed since the last
    /// successful compile. [`ShaderManager::update`] recompiles only when at
    /// least one provider reports `true` here.
    fn is_dirty(&self) -> bool;

    /// Called after a successful recompile that incorporated this provider's code.
    fn clear_dirty(&self) {}
}

/// Merges a base WGSL template with registered libraries and providers, recompiling
/// the shader module lazily. Bind-group layouts, pipeline layout, and vertex
/// buffers belong to the consumer (the grid renderer or a shader widget) since
/// those differ per use; this type owns only the text merge and module compile.
pub struct ShaderManager {
    base_shader: String,
    libraries: BTreeMap<String, String>,
    providers: Vec<Arc<dyn ShaderProvider>>,
    merged_source: String,
    shader_module: Option<wgpu::ShaderModule>,
}

impl ShaderManager {
    pub fn create(base_shader: impl Into<String>) -> Result<Self> {
        let base_shader = base_shader.into();
        if base_shader.is_empty() {
            return Err(Error::invalid_argument("base shader source is empty"));
        }
        Ok(Self {
            base_shader,
            libraries: BTreeMap::new(),
            providers: Vec::new(),
            merged_source: String::new(),
            shader_module: None,
        })
    }

    /// Registers (or replaces) a named shader library. Libraries are merged into
    /// the functions section in alphabetical order by name, ahead of provider code.
    pub fn add_library(&mut self, name: impl Into<String>, code: impl Into<String>) {
        self.libraries.insert(name.into(), code.into());
    }

    pub fn add_provider(&mut self, provider: Arc<dyn ShaderProvider>) {
        self.providers.push(provider);
    }

    pub fn needs_recompile(&self) -> bool {
        self.shader_module.is_none() || self.providers.iter().any(|p| p.is_dirty())
    }

    /// Total function count across every registered provider, summing each
    /// provider's own [`ShaderProvider::function_count`].
    pub fn total_function_count(&self) -> usize {
        self.providers.iter().map(|p| p.function_count()).sum()
    }

    /// Recompiles only if [`Self::needs_recompile`]; logs and keeps the previous
    /// module on a compile failure, per the crate's error propagation policy for
    /// shader compile failures.
    pub fn update(&mut self, device: &wgpu::Device) {
        if !self.needs_recompile() {
            return;
        }
        if let Err(e) = self.compile(device) {
            tracing::error!(target: "yetty.shader", error = %crate::error::chain_to_string(&e), "recompile failed, keeping previous pipeline");
        }
    }

    fn merge_shaders(&self) -> String {
        let mut result = self.base_shader.clone();

        let mut all_functions = String::with_capacity(64 * 1024);
        for (name, code) in &self.libraries {
            all_functions.push_str("// Library: ");
            all_functions.push_str(name);
            all_functions.push('\n');
            all_functions.push_str(code);
            all_functions.push_str("\n\n");
        }
        for provider in &self.providers {
            all_functions.push_str(&provider.code());
        }

        let mut all_dispatch = String::with_capacity(16 * 1024);
        for provider in &self.providers {
            let dispatch = provider.dispatch_code();
            if !dispatch.is_empty() {
                if !all_dispatch.is_empty() {
                    all_dispatch.push_str(" else ");
                }
                all_dispatch.push_str(&dispatch);
            }
        }

        replace_placeholder(&mut result, FUNCTIONS_PLACEHOLDER, &all_functions);
        replace_placeholder(&mut result, DISPATCH_PLACEHOLDER, &all_dispatch);
        // The pre/post-effect sections have no providers in this crate's current
        // widget set (only the multipass shader widget drives full passes); the
        // placeholders are still replaced with empty strings so a base shader that
        // uses them compiles cleanly with no effects active.
        replace_placeholder(&mut result, PRE_EFFECT_FUNCTIONS_PLACEHOLDER, "");
        replace_placeholder(&mut result, PRE_EFFECT_APPLY_PLACEHOLDER, "");
        replace_placeholder(&mut result, POST_EFFECT_FUNCTIONS_PLACEHOLDER, "");
        replace_placeholder(&mut result, POST_EFFECT_APPLY_PLACEHOLDER, "");

        result
    }

    /// Forces a recompile regardless of dirty state.
    pub fn compile(&mut self, device: &wgpu::Device) -> Result<()> {
        self.merged_source = self.merge_shaders();
        let module = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("merged shader"),
                source: wgpu::ShaderSource::Wgsl(self.merged_source.clone().into()),
            })
        }))
        .map_err(|_| Error::shader_compile_failed("shader module creation panicked"))?;
        self.shader_module = Some(module);
        tracing::debug!(target: "yetty.shader", function_count = self.total_function_count(), "shader recompiled");
        for provider in &self.providers {
            provider.clear_dirty();
        }
        Ok(())
    }

    pub fn shader_module(&self) -> Option<&wgpu::ShaderModule> {
        self.shader_module.as_ref()
    }

    pub fn merged_source(&self) -> &str {
        &self.merged_source
    }
}

fn replace_placeholder(source: &mut String, placeholder: &str, replacement: &str) -> bool {
    if let Some(pos) = source.find(placeholder) {
        source.replace_range(pos..pos + placeholder.len(), replacement);
        true
    } else {
        tracing::warn!(target: "yetty.shader", placeholder, "placeholder not found in base shader");
        false
    }
}
