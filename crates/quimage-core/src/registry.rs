//! Scheme registry.
//!
//! Resolution runs in a fixed order and stops at the first failure:
//!
//! ```text
//! name ─▶ lexical check ─▶ approval gate ─▶ canonical dir inside root ─▶ handle
//!          PathEscape /      NotApproved      PathEscape / NotFound
//!          NotFound
//! ```
//!
//! Loaded schemes are cached per name. The cache maps each name to a
//! [`OnceCell`], so concurrent first loads of one name run the loader once
//! and everyone else waits for that result. Custom bundles bypass both the
//! approval gate and the cache.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::config::CodecConfig;
use crate::error::{CodecError, CodecResult};
use crate::kernels::KernelCatalog;
use crate::loader::{validate_scheme_name, SchemeLoader};
use crate::policy::{ApprovalPolicy, PolicyGate};
use crate::scheme::{EncodingScheme, SchemeOrigin};

/// Label custom bundles are reported under.
pub const CUSTOM_SCHEME_NAME: &str = "custom";

type SchemeCell = Arc<OnceCell<Arc<EncodingScheme>>>;

/// Explicit entry-file locations, relative to the trusted root.
///
/// `init`, `data` and `map` are mandatory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomBundle {
    pub init: PathBuf,
    pub data: PathBuf,
    pub map: PathBuf,
    pub retrieve: Option<PathBuf>,
}

impl CustomBundle {
    pub fn new(init: impl Into<PathBuf>, data: impl Into<PathBuf>, map: impl Into<PathBuf>) -> Self {
        Self {
            init: init.into(),
            data: data.into(),
            map: map.into(),
            retrieve: None,
        }
    }

    /// Attach a retrieve entry.
    pub fn with_retrieve(mut self, retrieve: impl Into<PathBuf>) -> Self {
        self.retrieve = Some(retrieve.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    Directory(PathBuf),
    Files {
        init: PathBuf,
        data: PathBuf,
        map: PathBuf,
        retrieve: Option<PathBuf>,
    },
}

/// Proof that a scheme passed resolution. Only the registry creates these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemeHandle {
    name: String,
    origin: SchemeOrigin,
    source: Source,
}

impl SchemeHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> SchemeOrigin {
        self.origin
    }
}

/// Resolves, loads and caches schemes under one trusted root.
pub struct SchemeRegistry {
    config: CodecConfig,
    loader: SchemeLoader,
    gate: PolicyGate,
    cache: RwLock<HashMap<String, SchemeCell>>,
}

impl SchemeRegistry {
    /// Registry with the built-in kernel catalog.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Config`] if `config` is invalid or its trusted
    /// root does not exist.
    pub fn new(config: CodecConfig, policy: Arc<dyn ApprovalPolicy>) -> CodecResult<Self> {
        Self::with_catalog(config, policy, KernelCatalog::builtin())
    }

    /// Registry with a caller-supplied kernel catalog.
    pub fn with_catalog(
        config: CodecConfig,
        policy: Arc<dyn ApprovalPolicy>,
        catalog: KernelCatalog,
    ) -> CodecResult<Self> {
        config.validate()?;
        let loader = SchemeLoader::new(
            &config.trusted_root,
            Arc::new(catalog),
            config.max_entry_bytes,
        )?;
        let gate = PolicyGate::from_config(policy, &config);
        debug!(root = %loader.root().display(), "scheme registry ready");
        Ok(Self {
            config,
            loader,
            gate,
            cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn catalog(&self) -> &KernelCatalog {
        self.loader.catalog()
    }

    /// Resolve `name` to a handle.
    ///
    /// # Errors
    ///
    /// [`CodecError::PathEscape`], [`CodecError::NotApproved`] or
    /// [`CodecError::SchemeNotFound`], in that order of precedence.
    pub fn resolve(&self, name: &str) -> CodecResult<SchemeHandle> {
        validate_scheme_name(name)?;
        if !self.gate.is_approved(name) {
            return Err(CodecError::not_approved(name));
        }
        let dir = self.loader.scheme_dir(name)?;
        debug!(scheme = name, "scheme resolved");
        Ok(SchemeHandle {
            name: name.to_owned(),
            origin: SchemeOrigin::Registered,
            source: Source::Directory(dir),
        })
    }

    /// Resolve an explicit bundle of entry files.
    ///
    /// Each location is confined to the trusted root. The approval gate is
    /// not consulted.
    ///
    /// # Errors
    ///
    /// [`CodecError::NotApproved`] unless `allow_custom_bundles` is set;
    /// [`CodecError::PathEscape`] or [`CodecError::SchemeNotFound`] for a
    /// location outside the root or missing.
    pub fn resolve_custom(&self, bundle: &CustomBundle) -> CodecResult<SchemeHandle> {
        if !self.config.allow_custom_bundles {
            return Err(CodecError::not_approved(CUSTOM_SCHEME_NAME));
        }
        let init = self.loader.confine_entry(CUSTOM_SCHEME_NAME, &bundle.init)?;
        let data = self.loader.confine_entry(CUSTOM_SCHEME_NAME, &bundle.data)?;
        let map = self.loader.confine_entry(CUSTOM_SCHEME_NAME, &bundle.map)?;
        let retrieve = bundle
            .retrieve
            .as_ref()
            .map(|p| self.loader.confine_entry(CUSTOM_SCHEME_NAME, p))
            .transpose()?;
        debug!("custom bundle resolved");
        Ok(SchemeHandle {
            name: CUSTOM_SCHEME_NAME.to_owned(),
            origin: SchemeOrigin::Custom,
            source: Source::Files {
                init,
                data,
                map,
                retrieve,
            },
        })
    }

    /// Load the scheme behind `handle`.
    ///
    /// Registered schemes are served from the cache after their first load;
    /// custom bundles are read fresh every time.
    ///
    /// # Errors
    ///
    /// [`CodecError::SchemeContractViolation`] for a malformed bundle.
    pub fn load(&self, handle: &SchemeHandle) -> CodecResult<Arc<EncodingScheme>> {
        match &handle.source {
            Source::Files {
                init,
                data,
                map,
                retrieve,
            } => self
                .loader
                .load_files(&handle.name, init, data, map, retrieve.as_deref())
                .map(Arc::new),
            Source::Directory(dir) => {
                let cell = self.cell(&handle.name);
                cell.get_or_try_init(|| {
                    info!(scheme = %handle.name, "loading scheme");
                    self.loader
                        .load_dir(&handle.name, dir, handle.origin)
                        .map(Arc::new)
                })
                .map(Arc::clone)
            }
        }
    }

    /// Resolve and load in one step.
    pub fn get(&self, name: &str) -> CodecResult<Arc<EncodingScheme>> {
        let handle = self.resolve(name)?;
        self.load(&handle)
    }

    /// Re-read `name` from disk and replace its cache entry.
    ///
    /// Callers holding the previous `Arc` keep using the old scheme.
    pub fn reload(&self, name: &str) -> CodecResult<Arc<EncodingScheme>> {
        let handle = self.resolve(name)?;
        let Source::Directory(dir) = &handle.source else {
            return self.load(&handle);
        };
        let scheme = Arc::new(self.loader.load_dir(name, dir, handle.origin)?);
        let cell = OnceCell::new();
        // A fresh cell is always empty.
        let _ = cell.set(Arc::clone(&scheme));
        self.cache.write().insert(name.to_owned(), Arc::new(cell));
        info!(scheme = name, "scheme reloaded");
        Ok(scheme)
    }

    /// Whether `name` currently has a loaded cache entry.
    pub fn is_cached(&self, name: &str) -> bool {
        self.cache
            .read()
            .get(name)
            .map_or(false, |cell| cell.get().is_some())
    }

    /// Names of all scheme directories under the trusted root.
    ///
    /// Entries whose names fail the lexical check or that resolve outside
    /// the root are skipped. Contents are not validated.
    pub fn list(&self) -> CodecResult<BTreeSet<String>> {
        let entries = std::fs::read_dir(self.loader.root()).map_err(|source| {
            crate::error::ConfigError::FileRead {
                path: self.config.trusted_root.clone(),
                source,
            }
        })?;
        let mut names = BTreeSet::new();
        for entry in entries.flatten() {
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if validate_scheme_name(&name).is_err() {
                continue;
            }
            if self.loader.scheme_dir(&name).is_ok() {
                names.insert(name);
            }
        }
        Ok(names)
    }

    /// [`list`](Self::list), filtered through the approval gate.
    pub fn list_approved(&self) -> CodecResult<BTreeSet<String>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|name| self.gate.is_approved(name))
            .collect())
    }

    fn cell(&self, name: &str) -> SchemeCell {
        if let Some(cell) = self.cache.read().get(name) {
            return Arc::clone(cell);
        }
        Arc::clone(self.cache.write().entry(name.to_owned()).or_default())
    }
}

impl std::fmt::Debug for SchemeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemeRegistry")
            .field("root", &self.loader.root())
            .field("gate", &self.gate)
            .field("cached", &self.cache.read().len())
            .finish()
    }
}
