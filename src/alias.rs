//! Class alias / trait compilation (spec.md §3 "ClassAlias", §4.3)
//!
//! AMF objects can carry a class name that maps to a host type with its
//! own serialization policy: which attributes are "static" (always sent,
//! in a fixed order), which are excluded, which are read-only on decode,
//! which get renamed on the wire, whether the instance also accepts
//! free-form dynamic attributes, and whether the class handles its own
//! byte-level (de)serialization ("externalizable").
//!
//! The upstream implementation discovers most of this by reflecting over
//! a live class object (descriptors, `__slots__`, `__mro__`). Rust has no
//! runtime reflection, so that discovery step is replaced by an explicit
//! declaration — [`AliasSpec`] stands in for the `__amf__` meta dict of
//! spec.md §6, and `bases` stands in for `__mro__`. The *merge policy* in
//! [`CompiledAlias::compile`] is otherwise unchanged from spec.md §4.3.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::bytestream::{ByteStream, ByteWriter};
use crate::context::Context;
use crate::error::{AmfError, Result};
use crate::value::{AmfObject, AttrMap, Value};

/// Declarative serialization policy for one host type — the Rust
/// equivalent of a class's `__amf__` meta (spec.md §6).
#[derive(Debug, Clone, Default)]
pub struct AliasSpec {
    pub type_name: String,
    /// Names of base aliases to merge from, in MRO-like order (nearest
    /// first); merging walks this list the way `compile` walks `__mro__`.
    pub bases: Vec<String>,
    pub static_attrs: Vec<String>,
    pub exclude_attrs: Vec<String>,
    pub readonly_attrs: Vec<String>,
    /// (wire_name, member_name) pairs; renamed on encode wire_name <-
    /// member_name, inverse on decode.
    pub synonym_attrs: Vec<(String, String)>,
    /// Three-valued dynamic-property policy: `None` = inherit/default,
    /// `Some(true/false)` = explicit.
    pub dynamic: Option<bool>,
    pub amf3_only: bool,
    pub sealed: bool,
    pub external: bool,
}

impl AliasSpec {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Default::default()
        }
    }

    pub fn extends(mut self, base: impl Into<String>) -> Self {
        self.bases.push(base.into());
        self
    }

    pub fn static_attrs(mut self, attrs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.static_attrs = attrs.into_iter().map(Into::into).collect();
        self
    }

    pub fn exclude(mut self, attrs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.exclude_attrs = attrs.into_iter().map(Into::into).collect();
        self
    }

    pub fn readonly(mut self, attrs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.readonly_attrs = attrs.into_iter().map(Into::into).collect();
        self
    }

    pub fn synonym(mut self, pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        self.synonym_attrs = pairs.into_iter().collect();
        self
    }

    pub fn dynamic(mut self, v: bool) -> Self {
        self.dynamic = Some(v);
        self
    }

    pub fn amf3_only(mut self, v: bool) -> Self {
        self.amf3_only = v;
        self
    }

    pub fn sealed(mut self, v: bool) -> Self {
        self.sealed = v;
        self
    }

    pub fn external(mut self, v: bool) -> Self {
        self.external = v;
        self
    }
}

/// Compiled serialization policy — the merged, finalized form of one or
/// more `AliasSpec`s, ready for the encoder/decoder to consult without
/// re-walking the base chain on every value (spec.md §4.3 step 5,
/// "Finalize").
#[derive(Debug, Clone)]
pub struct CompiledAlias {
    pub type_name: String,
    pub static_attrs: Vec<String>,
    pub exclude_attrs: HashSet<String>,
    pub readonly_attrs: HashSet<String>,
    pub synonym_wire_to_mem: HashMap<String, String>,
    pub synonym_mem_to_wire: HashMap<String, String>,
    pub dynamic: bool,
    pub amf3_only: bool,
    pub sealed: bool,
    pub external: bool,
    pub encodable: HashSet<String>,
    pub decodable: HashSet<String>,
    /// True iff no exclude/readonly/synonym filter applies and the type is
    /// dynamic and not a dict — lets the encoder skip the slow per-attr
    /// filtering path.
    pub shortcut_encode: bool,
    pub shortcut_decode: bool,
    pub is_dict: bool,
}

impl CompiledAlias {
    /// Implements the 5-step algorithm of spec.md §4.3: seed from the
    /// spec's own declared fields (steps 1-2 collapse into "declared
    /// fields" since there's no descriptor introspection to do), walk
    /// bases merging policy with static-attr prepend semantics (step 3),
    /// then finalize (step 5; step 4's `getCustomProperties` hook has no
    /// reflection to extend, so it's a no-op here).
    pub fn compile(spec: &AliasSpec, bases: &[Arc<CompiledAlias>]) -> Arc<CompiledAlias> {
        let mut static_attrs: Vec<String> = spec.static_attrs.clone();
        let mut static_set: HashSet<String> = static_attrs.iter().cloned().collect();
        let mut exclude_attrs: HashSet<String> = spec.exclude_attrs.iter().cloned().collect();
        let mut readonly_attrs: HashSet<String> = spec.readonly_attrs.iter().cloned().collect();
        let mut encodable: HashSet<String> = static_set.clone();
        let mut decodable: HashSet<String> = static_set.clone();
        let mut synonym_wire_to_mem: HashMap<String, String> = spec
            .synonym_attrs
            .iter()
            .cloned()
            .collect();

        let mut inherited_dynamic: Option<bool> = None;
        let mut inherited_sealed: Option<bool> = None;
        let mut amf3_only = spec.amf3_only;

        for base in bases {
            exclude_attrs.extend(base.exclude_attrs.iter().cloned());
            readonly_attrs.extend(base.readonly_attrs.iter().cloned());

            for a in base.static_attrs.iter().rev() {
                if !static_set.contains(a) {
                    static_attrs.insert(0, a.clone());
                    static_set.insert(a.clone());
                }
            }

            encodable.extend(base.encodable.iter().cloned());
            decodable.extend(base.decodable.iter().cloned());

            if !amf3_only {
                amf3_only = base.amf3_only;
            }
            if inherited_dynamic.is_none() {
                inherited_dynamic = Some(base.dynamic);
            }
            inherited_sealed = Some(base.sealed);

            for (wire, mem) in &base.synonym_wire_to_mem {
                synonym_wire_to_mem
                    .entry(wire.clone())
                    .or_insert_with(|| mem.clone());
            }
        }

        // Finalize (spec.md §4.3 step 5).
        let sealed = spec.sealed || inherited_sealed.unwrap_or(false) && spec.bases.is_empty();
        let dynamic = if spec.external {
            false
        } else if let Some(explicit) = spec.dynamic {
            explicit
        } else if sealed {
            false
        } else {
            inherited_dynamic.unwrap_or(true)
        };

        static_attrs.sort();
        for a in &static_attrs {
            encodable.insert(a.clone());
            decodable.insert(a.clone());
        }

        for a in &exclude_attrs {
            encodable.remove(a);
            decodable.remove(a);
        }
        for a in &readonly_attrs {
            decodable.remove(a);
        }

        let synonym_mem_to_wire = synonym_wire_to_mem
            .iter()
            .map(|(w, m)| (m.clone(), w.clone()))
            .collect();

        let shortcut_encode = exclude_attrs.is_empty()
            && readonly_attrs.is_empty()
            && synonym_wire_to_mem.is_empty()
            && dynamic
            && !spec.external;
        let shortcut_decode = shortcut_encode;

        Arc::new(CompiledAlias {
            type_name: spec.type_name.clone(),
            static_attrs,
            exclude_attrs,
            readonly_attrs,
            synonym_wire_to_mem,
            synonym_mem_to_wire,
            dynamic,
            amf3_only,
            sealed,
            external: spec.external,
            encodable,
            decodable,
            shortcut_encode,
            shortcut_decode,
            is_dict: false,
        })
    }

    /// Ordered (name, value) pairs to emit for `obj`, honoring
    /// `exclude`/`readonly`/`static` ordering and `synonym` rename
    /// (spec.md §4.3 "getEncodableAttributes").
    pub fn encodable_attrs(&self, obj: &AmfObject) -> Vec<(String, Value)> {
        let mut out = Vec::new();

        if self.shortcut_encode {
            for (k, v) in obj.attrs.iter() {
                let wire_name = self.synonym_mem_to_wire.get(k).cloned().unwrap_or_else(|| k.clone());
                out.push((wire_name, v.clone()));
            }
            return out;
        }

        for name in &self.static_attrs {
            let value = obj.attrs.get(name).cloned().unwrap_or(Value::Undefined);
            let wire_name = self
                .synonym_mem_to_wire
                .get(name)
                .cloned()
                .unwrap_or_else(|| name.clone());
            out.push((wire_name, value));
        }

        if self.dynamic {
            for (k, v) in obj.attrs.iter() {
                if self.static_attrs.iter().any(|s| s == k) {
                    continue;
                }
                if self.exclude_attrs.contains(k) {
                    continue;
                }
                let wire_name = self.synonym_mem_to_wire.get(k).cloned().unwrap_or_else(|| k.clone());
                out.push((wire_name, v.clone()));
            }
        }

        out
    }

    /// Filters an incoming wire attribute map down to what this alias
    /// permits to be applied to an instance (spec.md §4.3
    /// "getDecodableAttributes"): every static key must be present, then
    /// non-dynamic types intersect with `decodable`, then readonly/exclude
    /// are subtracted, then synonym rename is applied (wire -> member).
    pub fn decodable_attrs(&self, attrs: &AttrMap) -> Result<AttrMap> {
        for name in &self.static_attrs {
            let wire_name = self
                .synonym_mem_to_wire
                .get(name)
                .cloned()
                .unwrap_or_else(|| name.clone());
            if !attrs.contains_key(&wire_name) {
                return Err(AmfError::Decode(format!(
                    "missing static attribute {:?} for class {:?}",
                    name, self.type_name
                )));
            }
        }

        let mut out = AttrMap::new();
        for (wire_key, value) in attrs.iter() {
            let member_key = self
                .synonym_wire_to_mem
                .get(wire_key)
                .cloned()
                .unwrap_or_else(|| wire_key.clone());

            if self.readonly_attrs.contains(&member_key) {
                continue;
            }
            if self.exclude_attrs.contains(&member_key) {
                continue;
            }
            if !self.dynamic && !self.static_attrs.iter().any(|s| s == &member_key) {
                continue;
            }
            out.insert(member_key, value.clone());
        }
        Ok(out)
    }

    /// The dynamic (non-static) attributes to emit, wire-renamed. Separate
    /// from [`Self::encodable_attrs`] because AMF3's object wire format
    /// writes static attributes as bare positional values and dynamic ones
    /// as trailing (name, value) pairs — the two sections can't share one
    /// flat list the way AMF0's does.
    pub fn dynamic_extra_attrs(&self, obj: &AmfObject) -> Vec<(String, Value)> {
        if !self.dynamic {
            return Vec::new();
        }
        let mut out = Vec::new();
        for (k, v) in obj.attrs.iter() {
            if self.static_attrs.iter().any(|s| s == k) {
                continue;
            }
            if self.exclude_attrs.contains(k) {
                continue;
            }
            let wire_name = self.synonym_mem_to_wire.get(k).cloned().unwrap_or_else(|| k.clone());
            out.push((wire_name, v.clone()));
        }
        out
    }

    /// Builds a trait descriptor directly from an inline class-def section
    /// read off the wire. Used by the AMF3 decoder: an incoming trait need
    /// not correspond to any locally registered alias, so this bypasses
    /// [`Self::compile`] entirely rather than consulting the registry.
    pub fn from_wire(class_name: String, sealed_attrs: Vec<String>, dynamic: bool, external: bool) -> Arc<CompiledAlias> {
        let dynamic = dynamic && !external;
        let encodable: HashSet<String> = sealed_attrs.iter().cloned().collect();
        let decodable = encodable.clone();
        Arc::new(CompiledAlias {
            type_name: class_name,
            static_attrs: sealed_attrs,
            exclude_attrs: HashSet::new(),
            readonly_attrs: HashSet::new(),
            synonym_wire_to_mem: HashMap::new(),
            synonym_mem_to_wire: HashMap::new(),
            dynamic,
            amf3_only: true,
            sealed: !dynamic,
            external,
            encodable,
            decodable,
            shortcut_encode: false,
            shortcut_decode: false,
            is_dict: false,
        })
    }

    /// Allocator-style construction: a fresh instance with no user
    /// initializer invoked (spec.md §4.3 "createInstance").
    pub fn create_instance(&self) -> AmfObject {
        AmfObject::named(self.type_name.clone())
    }

    pub fn apply_attributes(&self, obj: &mut AmfObject, attrs: AttrMap) {
        for (k, v) in attrs {
            obj.attrs.insert(k, v);
        }
    }
}

/// Capability interface for a class that serializes its own body
/// (spec.md §9 "Externalizable callback"). Implementations receive the
/// shared stream and context directly rather than a bounded sub-view,
/// since Rust has no host object to bound a view around — the contract is
/// the same: read/write exactly the bytes you wrote, nothing more.
pub trait Externalizable: Send + Sync {
    fn write_external(&self, obj: &AmfObject, w: &mut ByteWriter, ctx: &mut Context) -> Result<()>;
    fn read_external(&self, r: &mut ByteStream, ctx: &mut Context) -> Result<AmfObject>;
}

/// Process-wide registry mapping AMF type names to their declared spec and
/// lazily-compiled alias (spec.md §6 registry API).
#[derive(Default)]
pub struct AliasRegistry {
    specs: HashMap<String, AliasSpec>,
    compiled: HashMap<String, Arc<CompiledAlias>>,
    externalizables: HashMap<String, Arc<dyn Externalizable>>,
}

impl AliasRegistry {
    pub fn register(&mut self, spec: AliasSpec) {
        self.compiled.remove(&spec.type_name);
        self.specs.insert(spec.type_name.clone(), spec);
    }

    /// Registers the same spec under additional type names — the nearest
    /// analogue to `register_alias_type` (spec.md §6) without Rust
    /// reflection: adapters that want one policy to cover several wire
    /// names call this instead of subclassing `ClassAlias`.
    pub fn register_aliases(&mut self, spec: AliasSpec, extra_names: &[&str]) {
        let primary = spec.type_name.clone();
        self.register(spec.clone());
        for name in extra_names {
            let mut alias_spec = spec.clone();
            alias_spec.type_name = name.to_string();
            alias_spec.bases = vec![primary.clone()];
            self.register(alias_spec);
        }
    }

    pub fn get_compiled(&mut self, type_name: &str) -> Result<Arc<CompiledAlias>> {
        if let Some(c) = self.compiled.get(type_name) {
            return Ok(c.clone());
        }
        let compiled = self.compile_recursive(type_name, &mut HashSet::new())?;
        self.compiled.insert(type_name.to_string(), compiled.clone());
        Ok(compiled)
    }

    fn compile_recursive(
        &self,
        type_name: &str,
        visiting: &mut HashSet<String>,
    ) -> Result<Arc<CompiledAlias>> {
        let spec = self
            .specs
            .get(type_name)
            .ok_or_else(|| AmfError::UnknownClassAlias(type_name.to_string()))?;

        if !visiting.insert(type_name.to_string()) {
            return Err(AmfError::Decode(format!(
                "cyclic alias inheritance involving {:?}",
                type_name
            )));
        }

        let mut bases = Vec::with_capacity(spec.bases.len());
        for base_name in &spec.bases {
            if let Some(cached) = self.compiled.get(base_name) {
                bases.push(cached.clone());
            } else {
                bases.push(self.compile_recursive(base_name, visiting)?);
            }
        }
        visiting.remove(type_name);

        Ok(CompiledAlias::compile(spec, &bases))
    }

    pub fn has_alias(&self, type_name: &str) -> bool {
        self.specs.contains_key(type_name)
    }

    pub fn register_externalizable(&mut self, type_name: impl Into<String>, handler: Arc<dyn Externalizable>) {
        self.externalizables.insert(type_name.into(), handler);
    }

    pub fn get_externalizable(&self, type_name: &str) -> Option<Arc<dyn Externalizable>> {
        self.externalizables.get(type_name).cloned()
    }
}

// Process-wide, like the upstream registry (spec.md §6): aliases and
// externalizable handlers are shared across every `Context` rather than
// scoped to one thread, matching the dispatch table's shape (`dispatch.rs`).
static REGISTRY: Mutex<Option<AliasRegistry>> = Mutex::new(None);

fn with_registry<R>(f: impl FnOnce(&mut AliasRegistry) -> R) -> R {
    let mut guard = REGISTRY.lock().unwrap();
    let registry = guard.get_or_insert_with(AliasRegistry::default);
    f(registry)
}

/// Registers a class alias spec (spec.md §6 `register_class`).
pub fn register_class(spec: AliasSpec) {
    with_registry(|r| r.register(spec));
}

/// Registers one spec under several wire type names (spec.md §6
/// `register_alias_type`).
pub fn register_alias_type(spec: AliasSpec, extra_names: &[&str]) {
    with_registry(|r| r.register_aliases(spec, extra_names));
}

/// Looks up (and lazily compiles) the alias for a wire type name. Raises
/// `UnknownClassAlias` if none is registered (spec.md §6 `get_class_alias`).
pub fn get_class_alias(type_name: &str) -> Result<Arc<CompiledAlias>> {
    with_registry(|r| r.get_compiled(type_name))
}

pub fn has_alias(type_name: &str) -> bool {
    with_registry(|r| r.has_alias(type_name))
}

/// Registers the reader/writer for an externalizable class (spec.md §6
/// `__readamf__`/`__writeamf__`).
pub fn register_externalizable(type_name: impl Into<String>, handler: Arc<dyn Externalizable>) {
    with_registry(|r| r.register_externalizable(type_name, handler));
}

pub fn get_externalizable(type_name: &str) -> Option<Arc<dyn Externalizable>> {
    with_registry(|r| r.get_externalizable(type_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiling_twice_is_idempotent() {
        let spec = AliasSpec::new("test.alias.Idempotent").static_attrs(["a", "b"]);
        let compiled_once = CompiledAlias::compile(&spec, &[]);
        let compiled_twice = CompiledAlias::compile(&spec, &[]);
        assert_eq!(compiled_once.static_attrs, compiled_twice.static_attrs);
        assert_eq!(compiled_once.dynamic, compiled_twice.dynamic);
    }

    #[test]
    fn static_ordering_and_exclude_and_readonly() {
        let spec = AliasSpec::new("test.alias.Filtered")
            .static_attrs(["z", "a"])
            .exclude(["secret"])
            .readonly(["id"]);
        let compiled = CompiledAlias::compile(&spec, &[]);

        assert_eq!(compiled.static_attrs, vec!["a".to_string(), "z".to_string()]);
        assert!(!compiled.encodable.contains("secret"));
        assert!(!compiled.decodable.contains("id"));
    }

    #[test]
    fn base_static_attrs_prepend_before_subclass_attrs() {
        let base = AliasSpec::new("test.alias.Base").static_attrs(["base_field"]);
        let compiled_base = CompiledAlias::compile(&base, &[]);

        let sub = AliasSpec::new("test.alias.Sub")
            .extends("test.alias.Base")
            .static_attrs(["sub_field"]);
        let compiled_sub = CompiledAlias::compile(&sub, &[compiled_base]);

        assert_eq!(
            compiled_sub.static_attrs,
            vec!["base_field".to_string(), "sub_field".to_string()]
        );
    }

    #[test]
    fn synonym_rename_is_bijective_across_encode_and_decode() {
        let spec = AliasSpec::new("test.alias.Synonym")
            .static_attrs(["local_name"])
            .synonym([("wireName".to_string(), "local_name".to_string())]);
        let compiled = CompiledAlias::compile(&spec, &[]);

        let mut obj = AmfObject::named("test.alias.Synonym");
        obj.attrs.insert("local_name".into(), Value::Integer(7));
        let encoded = compiled.encodable_attrs(&obj);
        assert_eq!(encoded[0].0, "wireName");

        let mut wire_attrs = AttrMap::new();
        wire_attrs.insert("wireName".into(), Value::Integer(7));
        let decoded = compiled.decodable_attrs(&wire_attrs).unwrap();
        assert_eq!(decoded.get("local_name"), Some(&Value::Integer(7)));
    }

    #[test]
    fn missing_static_attribute_fails_decode() {
        let spec = AliasSpec::new("test.alias.RequiresId").static_attrs(["id"]);
        let compiled = CompiledAlias::compile(&spec, &[]);
        let empty = AttrMap::new();
        assert!(compiled.decodable_attrs(&empty).is_err());
    }

    #[test]
    fn sealed_class_rejects_dynamic_attrs_on_decode() {
        let spec = AliasSpec::new("test.alias.Sealed")
            .static_attrs(["id"])
            .sealed(true);
        let compiled = CompiledAlias::compile(&spec, &[]);
        assert!(!compiled.dynamic);

        let mut wire_attrs = AttrMap::new();
        wire_attrs.insert("id".into(), Value::Integer(1));
        wire_attrs.insert("extra".into(), Value::Integer(2));
        let decoded = compiled.decodable_attrs(&wire_attrs).unwrap();
        assert!(decoded.contains_key("id"));
        assert!(!decoded.contains_key("extra"));
    }

    #[test]
    fn registry_roundtrip_register_and_lookup() {
        register_class(AliasSpec::new("test.alias.RegistryRoundtrip").static_attrs(["a"]));
        let compiled = get_class_alias("test.alias.RegistryRoundtrip").unwrap();
        assert_eq!(compiled.static_attrs, vec!["a".to_string()]);
        assert!(has_alias("test.alias.RegistryRoundtrip"));
    }

    #[test]
    fn unknown_alias_is_an_error() {
        let result = get_class_alias("test.alias.DoesNotExist");
        assert!(matches!(result, Err(AmfError::UnknownClassAlias(_))));
    }
}
