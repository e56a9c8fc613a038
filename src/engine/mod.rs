mod handle;

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::types::{Args, NodeRef, Value};

pub use crate::engine::handle::Handle;

/// Type-erased task body: takes the resolved positional arguments and returns
/// the erased output.
pub(crate) type Callable = Arc<dyn Fn(&Args<'_>) -> anyhow::Result<Value> + Send + Sync>;

/// A single argument binding of a task.
#[derive(Clone)]
pub enum Arg {
    /// A concrete value known at construction time. Contributes no edge.
    Literal(Value),
    /// The future result of another task. Contributes exactly one edge.
    Ref(NodeRef),
}

impl Arg {
    pub fn literal<T: Send + Sync + 'static>(data: T) -> Self {
        Arg::Literal(Arc::new(data))
    }

    /// The referenced node, if this argument is a handle.
    pub fn node(&self) -> Option<NodeRef> {
        match self {
            Arg::Literal(_) => None,
            Arg::Ref(node) => Some(*node),
        }
    }
}

impl From<NodeRef> for Arg {
    fn from(node: NodeRef) -> Self {
        Arg::Ref(node)
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Literal(_) => write!(f, "Arg::Literal(*)"),
            Arg::Ref(node) => write!(f, "Arg::Ref({node})"),
        }
    }
}

/// The unit of deferred computation stored in the graph: a callable, its
/// ordered argument bindings and some metadata for export.
///
/// Nodes are immutable once added to a graph.
pub struct TaskNode {
    pub(crate) name: Cow<'static, str>,
    pub(crate) output: &'static str,
    pub(crate) args: Vec<Arg>,
    pub(crate) callable: Callable,
}

impl TaskNode {
    pub(crate) fn new(
        name: Cow<'static, str>,
        output: &'static str,
        args: Vec<Arg>,
        callable: Callable,
    ) -> Self {
        Self {
            name,
            output,
            args,
            callable,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type name of the value this task produces.
    pub fn output_type(&self) -> &'static str {
        self.output
    }

    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    /// Upstream nodes in argument order, one entry per handle-valued argument.
    pub fn dependencies(&self) -> impl Iterator<Item = NodeRef> + '_ {
        self.args.iter().filter_map(Arg::node)
    }
}

impl fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskNode")
            .field("name", &self.name)
            .field("output", &self.output)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// A trait that enables a collection of [`Handle<T>`]s to be used as
/// dependencies for a task.
///
/// This trait is implemented for single handles, tuples of handles and
/// vectors of same-typed handles, allowing them to be passed to
/// [`TaskDef::depends_on`](crate::TaskDef::depends_on). It provides
/// the logic to turn the handles into argument bindings and to resolve the
/// upstream outputs back into references of the right types.
pub trait Dependencies {
    /// The resulting type when all dependencies are resolved.
    /// For a tuple of [`Handle<T>`]s, this will be a tuple of `&'a T`s.
    type Output<'a>;

    /// The argument bindings, in order.
    fn args(&self) -> Vec<Arg>;

    /// Resolves positional arguments into the concrete `Output` type.
    fn resolve<'a>(&self, args: &Args<'a>) -> anyhow::Result<Self::Output<'a>>;
}

impl Dependencies for () {
    type Output<'a> = ();

    fn args(&self) -> Vec<Arg> {
        vec![]
    }

    fn resolve<'a>(&self, _: &Args<'a>) -> anyhow::Result<Self::Output<'a>> {
        Ok(())
    }
}

impl<T> Dependencies for Handle<T>
where
    T: Send + Sync + 'static,
{
    type Output<'a> = &'a T;

    fn args(&self) -> Vec<Arg> {
        vec![Arg::from(*self)]
    }

    fn resolve<'a>(&self, args: &Args<'a>) -> anyhow::Result<Self::Output<'a>> {
        args.get::<T>(0)
    }
}

impl<T> Dependencies for Vec<Handle<T>>
where
    T: Send + Sync + 'static,
{
    type Output<'a> = Vec<&'a T>;

    fn args(&self) -> Vec<Arg> {
        self.iter().map(Arg::from).collect()
    }

    fn resolve<'a>(&self, args: &Args<'a>) -> anyhow::Result<Self::Output<'a>> {
        args.all::<T>()
    }
}

macro_rules! impl_deps {
    ($($T:ident),*) => {
        #[allow(non_snake_case, unused_assignments)]
        impl<$($T: Send + Sync + 'static),*> Dependencies for ($(Handle<$T>,)*) {
            type Output<'a> = ($(&'a $T,)*);

            fn args(&self) -> Vec<Arg> {
                let ($($T,)*) = self;
                vec![$(Arg::from(*$T)),*]
            }

            fn resolve<'a>(&self, args: &Args<'a>) -> anyhow::Result<Self::Output<'a>> {
                let mut position = 0;
                Ok(($({
                    let item = args.get::<$T>(position)?;
                    position += 1;
                    item
                },)*))
            }
        }
    };
}

impl_deps!(A);
impl_deps!(A, B);
impl_deps!(A, B, C);
impl_deps!(A, B, C, D);
impl_deps!(A, B, C, D, E);
impl_deps!(A, B, C, D, E, F);
impl_deps!(A, B, C, D, E, F, G);
impl_deps!(A, B, C, D, E, F, G, H);
