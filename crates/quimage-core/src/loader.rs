//! Path-confined scheme loading.
//!
//! Scheme names are checked lexically before anything else happens; only
//! after the policy gate has approved a name is the filesystem touched.
//! Every directory and entry file is canonicalized and must resolve strictly
//! inside the canonical trusted root, which also catches symlinks pointing
//! elsewhere. Entry files are size-limited JSON declarations handed to the
//! [`KernelCatalog`]; their content is never executed.
//!
//! Errors produced here carry the scheme name and a path-free reason only.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::error::{CodecError, CodecResult, ConfigError};
use crate::kernels::{EntryPoint, KernelCatalog, KernelSpec};
use crate::scheme::{EncodingScheme, SchemeOrigin};

/// Longest accepted scheme name.
pub const MAX_NAME_LEN: usize = 64;

/// Lexical check of a scheme name.
///
/// Anything that could address a location other than a direct child of the
/// trusted root is a [`CodecError::PathEscape`]: `.` and `..`, path
/// separators, absolute paths, drive prefixes, `~` and NUL bytes. Names that
/// are harmless but can never be a scheme directory (other punctuation,
/// non-ASCII, overlong) are [`CodecError::SchemeNotFound`].
pub fn validate_scheme_name(name: &str) -> CodecResult<()> {
    let escapes = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.starts_with('~')
        || name.contains('\0')
        || name.chars().nth(1) == Some(':')
        || Path::new(name).is_absolute();
    if escapes {
        return Err(CodecError::path_escape(name));
    }

    let charset_ok = name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if !charset_ok || name.len() > MAX_NAME_LEN {
        return Err(CodecError::not_found(name));
    }
    Ok(())
}

/// Reads scheme bundles from inside a canonical trusted root.
#[derive(Debug, Clone)]
pub struct SchemeLoader {
    root: PathBuf,
    catalog: Arc<KernelCatalog>,
    max_entry_bytes: u64,
}

impl SchemeLoader {
    /// Loader rooted at `trusted_root`, which must exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FileRead`] if the root cannot be canonicalized.
    pub fn new(
        trusted_root: &Path,
        catalog: Arc<KernelCatalog>,
        max_entry_bytes: u64,
    ) -> CodecResult<Self> {
        let root = trusted_root
            .canonicalize()
            .map_err(|source| ConfigError::FileRead {
                path: trusted_root.to_path_buf(),
                source,
            })?;
        Ok(Self {
            root,
            catalog,
            max_entry_bytes,
        })
    }

    /// Canonical trusted root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn catalog(&self) -> &KernelCatalog {
        &self.catalog
    }

    /// Canonical directory of an already name-checked scheme.
    ///
    /// # Errors
    ///
    /// [`CodecError::PathEscape`] if the directory resolves outside the root,
    /// [`CodecError::SchemeNotFound`] if it does not exist or is not a
    /// directory.
    pub fn scheme_dir(&self, name: &str) -> CodecResult<PathBuf> {
        let candidate = self.root.join(name);
        let canonical = candidate
            .canonicalize()
            .map_err(|_| CodecError::not_found(name))?;
        if !self.is_strictly_inside(&canonical) {
            return Err(CodecError::path_escape(name));
        }
        if !canonical.is_dir() {
            return Err(CodecError::not_found(name));
        }
        Ok(canonical)
    }

    /// Confine a custom-bundle entry location, given relative to the root.
    ///
    /// `label` is what errors report instead of the path.
    pub fn confine_entry(&self, label: &str, relative: &Path) -> CodecResult<PathBuf> {
        if relative.as_os_str().is_empty() {
            return Err(CodecError::path_escape(label));
        }
        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    let part = part.to_str().ok_or_else(|| CodecError::path_escape(label))?;
                    if part.starts_with('~') || part.contains('\0') || part.contains('\\') {
                        return Err(CodecError::path_escape(label));
                    }
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(CodecError::path_escape(label));
                }
            }
        }
        let canonical = self
            .root
            .join(relative)
            .canonicalize()
            .map_err(|_| CodecError::not_found(label))?;
        if !self.is_strictly_inside(&canonical) {
            return Err(CodecError::path_escape(label));
        }
        Ok(canonical)
    }

    /// Load the bundle in `dir` (already confined).
    pub fn load_dir(
        &self,
        name: &str,
        dir: &Path,
        origin: SchemeOrigin,
    ) -> CodecResult<EncodingScheme> {
        let read = |entry: EntryPoint| self.read_entry(name, entry, &dir.join(entry.file_name()));
        let init = read(EntryPoint::Init)?;
        let data = read(EntryPoint::Data)?;
        let map = read(EntryPoint::Map)?;
        let retrieve = read(EntryPoint::Retrieve)?;
        self.assemble(name, origin, init, data, map, retrieve)
    }

    /// Load a bundle from explicit, already confined entry files.
    pub fn load_files(
        &self,
        name: &str,
        init: &Path,
        data: &Path,
        map: &Path,
        retrieve: Option<&Path>,
    ) -> CodecResult<EncodingScheme> {
        let init = self.read_entry(name, EntryPoint::Init, init)?;
        let data = self.read_entry(name, EntryPoint::Data, data)?;
        let map = self.read_entry(name, EntryPoint::Map, map)?;
        let retrieve = match retrieve {
            Some(path) => self.read_entry(name, EntryPoint::Retrieve, path)?,
            None => None,
        };
        self.assemble(name, SchemeOrigin::Custom, init, data, map, retrieve)
    }

    fn assemble(
        &self,
        name: &str,
        origin: SchemeOrigin,
        init: Option<KernelSpec>,
        data: Option<KernelSpec>,
        map: Option<KernelSpec>,
        retrieve: Option<KernelSpec>,
    ) -> CodecResult<EncodingScheme> {
        let missing = |entry: EntryPoint| {
            CodecError::contract(name, format!("required entry '{entry}' is missing"))
        };
        let init = init.ok_or_else(|| missing(EntryPoint::Init))?;
        let data = data.ok_or_else(|| missing(EntryPoint::Data))?;
        let map = map.ok_or_else(|| missing(EntryPoint::Map))?;

        let init = self.catalog.build_init(name, &init)?;
        let data = self.catalog.build_data(name, &data)?;
        let map = self.catalog.build_map(name, &map)?;
        let retrieve = retrieve
            .map(|spec| self.catalog.build_retrieve(name, &spec))
            .transpose()?;

        if let Some(r) = &retrieve {
            let payload = map.payload_qubits() as usize;
            if r.layout().payload_bits != payload {
                return Err(CodecError::contract(
                    name,
                    format!(
                        "retrieve reads {} payload bits but map writes {payload}",
                        r.layout().payload_bits
                    ),
                ));
            }
        }

        debug!(
            scheme = name,
            ?origin,
            payload_qubits = map.payload_qubits(),
            has_retrieve = retrieve.is_some(),
            "scheme assembled"
        );
        Ok(EncodingScheme::new(name, origin, init, data, map, retrieve))
    }

    /// Read one entry file. A missing file is `Ok(None)`.
    fn read_entry(
        &self,
        name: &str,
        entry: EntryPoint,
        path: &Path,
    ) -> CodecResult<Option<KernelSpec>> {
        match path.symlink_metadata() {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(_) => {
                return Err(CodecError::contract(
                    name,
                    format!("entry '{entry}' is unreadable"),
                ));
            }
        }

        let canonical = path
            .canonicalize()
            .map_err(|_| CodecError::contract(name, format!("entry '{entry}' is a dangling link")))?;
        if !self.is_strictly_inside(&canonical) {
            return Err(CodecError::path_escape(name));
        }

        let meta = canonical
            .metadata()
            .map_err(|_| CodecError::contract(name, format!("entry '{entry}' is unreadable")))?;
        if !meta.is_file() {
            return Err(CodecError::contract(
                name,
                format!("entry '{entry}' is not a regular file"),
            ));
        }
        if meta.len() > self.max_entry_bytes {
            return Err(CodecError::contract(
                name,
                format!("entry '{entry}' exceeds {} bytes", self.max_entry_bytes),
            ));
        }

        let mut text = String::new();
        File::open(&canonical)
            .and_then(|f| f.take(self.max_entry_bytes + 1).read_to_string(&mut text))
            .map_err(|_| CodecError::contract(name, format!("entry '{entry}' is unreadable")))?;
        if text.len() as u64 > self.max_entry_bytes {
            return Err(CodecError::contract(
                name,
                format!("entry '{entry}' exceeds {} bytes", self.max_entry_bytes),
            ));
        }

        let spec: KernelSpec = serde_json::from_str(&text)
            .map_err(|e| CodecError::contract(name, format!("entry '{entry}' is malformed: {e}")))?;
        debug!(scheme = name, %entry, kernel = %spec.kernel, "entry parsed");
        Ok(Some(spec))
    }

    fn is_strictly_inside(&self, canonical: &Path) -> bool {
        canonical.starts_with(&self.root) && canonical != self.root
    }
}
