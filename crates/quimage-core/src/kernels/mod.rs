//! Compiled-in kernel catalog.
//!
//! Scheme entry files name a kernel and its parameters; the catalog turns
//! that declaration into a capability object of the matching role. Nothing
//! read from a scheme directory is ever executed, so a scheme can only
//! combine kernels that were linked into the process. Embedders can
//! [`register`](KernelCatalog::register_map) additional kernels before
//! building a registry.
//!
//! | Role       | Built-in kernels                                                   |
//! |------------|--------------------------------------------------------------------|
//! | `init`     | `zero`, `uniform`, `uniform_positions`                             |
//! | `data`     | `row_major_basis`, `grid_basis`                                    |
//! | `map`      | `ry_angle`, `ry_segmented`, `binary_x`, `ry_bit_pairs`,            |
//! |            | `ry_channels`, `binary_channels`, `ry_packed_rgb`                  |
//! | `retrieve` | `probability`, `angle`, `binary`, `bit_pairs`, `angle_channels`,   |
//! |            | `binary_channels`, `packed_angle`                                  |

pub mod data;
pub mod init;
pub mod map;
pub mod retrieve;

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CodecError, CodecResult};
use crate::scheme::{PayloadMap, PositionEncoder, Retrieve, StatePrep};

/// Raw kernel parameters as found in an entry file.
pub type KernelParams = serde_json::Value;

type InitCtor = Box<dyn Fn(&KernelParams) -> Result<Box<dyn StatePrep>, String> + Send + Sync>;
type DataCtor = Box<dyn Fn(&KernelParams) -> Result<Box<dyn PositionEncoder>, String> + Send + Sync>;
type MapCtor = Box<dyn Fn(&KernelParams) -> Result<Box<dyn PayloadMap>, String> + Send + Sync>;
type RetrieveCtor = Box<dyn Fn(&KernelParams) -> Result<Box<dyn Retrieve>, String> + Send + Sync>;

/// The four roles a scheme entry can fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntryPoint {
    Init,
    Data,
    Map,
    Retrieve,
}

impl EntryPoint {
    /// Name of the entry file inside a scheme directory.
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Init => "init.json",
            Self::Data => "data.json",
            Self::Map => "map.json",
            Self::Retrieve => "retrieve.json",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Data => "data",
            Self::Map => "map",
            Self::Retrieve => "retrieve",
        }
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contents of one entry file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KernelSpec {
    pub kernel: String,
    #[serde(default)]
    pub params: KernelParams,
}

impl KernelSpec {
    pub fn new(kernel: impl Into<String>, params: KernelParams) -> Self {
        Self {
            kernel: kernel.into(),
            params,
        }
    }
}

/// Deserialize kernel parameters, treating a missing `params` as `{}`.
pub fn parse_params<T: DeserializeOwned>(params: &KernelParams) -> Result<T, String> {
    let value = if params.is_null() {
        KernelParams::Object(serde_json::Map::new())
    } else {
        params.clone()
    };
    serde_json::from_value(value).map_err(|e| e.to_string())
}

/// Name → constructor tables, one per role.
pub struct KernelCatalog {
    init: BTreeMap<String, InitCtor>,
    data: BTreeMap<String, DataCtor>,
    map: BTreeMap<String, MapCtor>,
    retrieve: BTreeMap<String, RetrieveCtor>,
}

impl KernelCatalog {
    /// A catalog with no kernels.
    pub fn empty() -> Self {
        Self {
            init: BTreeMap::new(),
            data: BTreeMap::new(),
            map: BTreeMap::new(),
            retrieve: BTreeMap::new(),
        }
    }

    /// A catalog holding every built-in kernel.
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        init::register(&mut catalog);
        data::register(&mut catalog);
        map::register(&mut catalog);
        retrieve::register(&mut catalog);
        catalog
    }

    pub fn register_init<F>(&mut self, name: impl Into<String>, ctor: F)
    where
        F: Fn(&KernelParams) -> Result<Box<dyn StatePrep>, String> + Send + Sync + 'static,
    {
        self.init.insert(name.into(), Box::new(ctor));
    }

    pub fn register_data<F>(&mut self, name: impl Into<String>, ctor: F)
    where
        F: Fn(&KernelParams) -> Result<Box<dyn PositionEncoder>, String> + Send + Sync + 'static,
    {
        self.data.insert(name.into(), Box::new(ctor));
    }

    pub fn register_map<F>(&mut self, name: impl Into<String>, ctor: F)
    where
        F: Fn(&KernelParams) -> Result<Box<dyn PayloadMap>, String> + Send + Sync + 'static,
    {
        self.map.insert(name.into(), Box::new(ctor));
    }

    pub fn register_retrieve<F>(&mut self, name: impl Into<String>, ctor: F)
    where
        F: Fn(&KernelParams) -> Result<Box<dyn Retrieve>, String> + Send + Sync + 'static,
    {
        self.retrieve.insert(name.into(), Box::new(ctor));
    }

    /// Kernel names available for `role`, sorted.
    pub fn names(&self, role: EntryPoint) -> Vec<&str> {
        match role {
            EntryPoint::Init => self.init.keys().map(String::as_str).collect(),
            EntryPoint::Data => self.data.keys().map(String::as_str).collect(),
            EntryPoint::Map => self.map.keys().map(String::as_str).collect(),
            EntryPoint::Retrieve => self.retrieve.keys().map(String::as_str).collect(),
        }
    }

    fn roles_of(&self, kernel: &str) -> Vec<EntryPoint> {
        let mut roles = Vec::new();
        if self.init.contains_key(kernel) {
            roles.push(EntryPoint::Init);
        }
        if self.data.contains_key(kernel) {
            roles.push(EntryPoint::Data);
        }
        if self.map.contains_key(kernel) {
            roles.push(EntryPoint::Map);
        }
        if self.retrieve.contains_key(kernel) {
            roles.push(EntryPoint::Retrieve);
        }
        roles
    }

    pub fn build_init(&self, scheme: &str, spec: &KernelSpec) -> CodecResult<Box<dyn StatePrep>> {
        self.build(&self.init, EntryPoint::Init, scheme, spec)
    }

    pub fn build_data(
        &self,
        scheme: &str,
        spec: &KernelSpec,
    ) -> CodecResult<Box<dyn PositionEncoder>> {
        self.build(&self.data, EntryPoint::Data, scheme, spec)
    }

    pub fn build_map(&self, scheme: &str, spec: &KernelSpec) -> CodecResult<Box<dyn PayloadMap>> {
        self.build(&self.map, EntryPoint::Map, scheme, spec)
    }

    pub fn build_retrieve(
        &self,
        scheme: &str,
        spec: &KernelSpec,
    ) -> CodecResult<Box<dyn Retrieve>> {
        self.build(&self.retrieve, EntryPoint::Retrieve, scheme, spec)
    }

    fn build<T: ?Sized>(
        &self,
        table: &BTreeMap<String, Box<dyn Fn(&KernelParams) -> Result<Box<T>, String> + Send + Sync>>,
        role: EntryPoint,
        scheme: &str,
        spec: &KernelSpec,
    ) -> CodecResult<Box<T>> {
        let Some(ctor) = table.get(&spec.kernel) else {
            let other = self.roles_of(&spec.kernel);
            let reason = match other.first() {
                Some(r) => format!(
                    "entry '{role}' names kernel '{}', which is a {r} kernel",
                    spec.kernel
                ),
                None => format!("entry '{role}' names unknown kernel '{}'", spec.kernel),
            };
            return Err(CodecError::contract(scheme, reason));
        };
        ctor(&spec.params).map_err(|e| {
            CodecError::contract(
                scheme,
                format!("invalid params for {role} kernel '{}': {e}", spec.kernel),
            )
        })
    }
}

impl Default for KernelCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for KernelCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelCatalog")
            .field("init", &self.names(EntryPoint::Init))
            .field("data", &self.names(EntryPoint::Data))
            .field("map", &self.names(EntryPoint::Map))
            .field("retrieve", &self.names(EntryPoint::Retrieve))
            .finish()
    }
}
