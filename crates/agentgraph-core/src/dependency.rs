//! Dependency functions and their parameters.
//!
//! A [`DepFn`] is a named synchronous computation. Each parameter is either
//! another dependency function ([`Param::Dep`]) or a node type whose most
//! recent instance is pulled from the execution trace ([`Param::Node`]).
//!
//! Functions can be forward-declared with [`DepFn::declare`] and defined later
//! with [`DepFn::define`], which is how mutually referencing functions are
//! written. Such references may form cycles; the resolver rejects those before
//! invoking anything.
//!
//! Parameters hold strong references. Forward declarations that end up acyclic
//! are freed normally, but functions defined into a reference cycle keep each
//! other alive for the life of the process. Graph construction rejects such
//! cycles, so this only affects code that builds them and then drops them.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use serde::de::DeserializeOwned;
use serde_json::Value;
use smallvec::SmallVec;

use crate::error::ConfigError;
use crate::id::DepId;
use crate::node::NodeInstance;

type DepCall = dyn Fn(&DepArgs<'_>) -> anyhow::Result<Value> + Send + Sync;

/// One declared parameter of a dependency function.
#[derive(Clone, Debug)]
pub enum Param {
    /// Value produced by another dependency function.
    Dep(DepFn),
    /// Most recent trace instance of the named node type (or supertype).
    Node(String),
}

impl Param {
    pub fn dep(function: &DepFn) -> Self {
        Param::Dep(function.clone())
    }

    pub fn node(node_type: impl Into<String>) -> Self {
        Param::Node(node_type.into())
    }
}

struct DepBody {
    params: SmallVec<[Param; 4]>,
    call: Box<DepCall>,
}

struct DepFnInner {
    id: DepId,
    name: String,
    body: OnceLock<DepBody>,
}

/// Shared handle to a dependency function.
///
/// Cloning is cheap; equality and hashing use the function's [`DepId`].
#[derive(Clone)]
pub struct DepFn(Arc<DepFnInner>);

impl DepFn {
    /// Declares and defines a function in one go.
    pub fn new<F>(name: impl Into<String>, params: impl IntoIterator<Item = Param>, call: F) -> Self
    where
        F: Fn(&DepArgs<'_>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let function = Self::declare(name);
        let body = DepBody {
            params: params.into_iter().collect(),
            call: Box::new(call),
        };
        // A freshly declared cell is always empty.
        let _ = function.0.body.set(body);
        function
    }

    /// Declares a function whose body is supplied later via [`define`](Self::define).
    pub fn declare(name: impl Into<String>) -> Self {
        DepFn(Arc::new(DepFnInner {
            id: DepId::next(),
            name: name.into(),
            body: OnceLock::new(),
        }))
    }

    /// Supplies the parameters and body of a forward-declared function.
    pub fn define<F>(
        &self,
        params: impl IntoIterator<Item = Param>,
        call: F,
    ) -> Result<(), ConfigError>
    where
        F: Fn(&DepArgs<'_>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let body = DepBody {
            params: params.into_iter().collect(),
            call: Box::new(call),
        };
        self.0
            .body
            .set(body)
            .map_err(|_| ConfigError::DependencyRedefined {
                function: self.name().to_string(),
            })
    }

    pub fn id(&self) -> DepId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Whether a body has been supplied.
    pub fn is_defined(&self) -> bool {
        self.0.body.get().is_some()
    }

    /// Declared parameters; empty for an undefined function.
    pub fn params(&self) -> &[Param] {
        self.0.body.get().map(|b| b.params.as_slice()).unwrap_or(&[])
    }

    /// Functions this one depends on directly, in parameter order.
    pub fn dependencies(&self) -> impl Iterator<Item = &DepFn> {
        self.params().iter().filter_map(|p| match p {
            Param::Dep(f) => Some(f),
            Param::Node(_) => None,
        })
    }

    /// Node types this function reads from the trace.
    pub fn trace_params(&self) -> impl Iterator<Item = &str> {
        self.params().iter().filter_map(|p| match p {
            Param::Node(t) => Some(t.as_str()),
            Param::Dep(_) => None,
        })
    }

    /// Invokes the body. Returns `None` if the function was never defined.
    pub fn invoke(&self, args: &DepArgs<'_>) -> Option<anyhow::Result<Value>> {
        self.0.body.get().map(|b| (b.call)(args))
    }
}

impl PartialEq for DepFn {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for DepFn {}

impl Hash for DepFn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for DepFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DepFn")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("defined", &self.is_defined())
            .finish()
    }
}

/// A resolved argument handed to a dependency function.
#[derive(Debug, Clone, Copy)]
pub enum Arg<'a> {
    Value(&'a Value),
    Node(&'a NodeInstance),
}

/// Positional arguments for one dependency invocation.
#[derive(Debug)]
pub struct DepArgs<'a> {
    function: &'a str,
    args: Vec<Arg<'a>>,
}

impl<'a> DepArgs<'a> {
    pub fn new(function: &'a str, args: Vec<Arg<'a>>) -> Self {
        DepArgs { function, args }
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// The value of a [`Param::Dep`] argument.
    pub fn value(&self, index: usize) -> anyhow::Result<&'a Value> {
        match self.args.get(index).copied() {
            Some(Arg::Value(v)) => Ok(v),
            Some(Arg::Node(_)) => anyhow::bail!(
                "argument {index} of '{}' is a node, not a value",
                self.function
            ),
            None => anyhow::bail!("'{}' has no argument {index}", self.function),
        }
    }

    /// The trace instance of a [`Param::Node`] argument.
    pub fn node(&self, index: usize) -> anyhow::Result<&'a NodeInstance> {
        match self.args.get(index).copied() {
            Some(Arg::Node(n)) => Ok(n),
            Some(Arg::Value(_)) => anyhow::bail!(
                "argument {index} of '{}' is a value, not a node",
                self.function
            ),
            None => anyhow::bail!("'{}' has no argument {index}", self.function),
        }
    }

    /// Deserializes a [`Param::Dep`] argument.
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> anyhow::Result<T> {
        let value = self.value(index)?;
        Ok(serde_json::from_value(value.clone())?)
    }
}
