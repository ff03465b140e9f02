//! Sequence recipes.
//!
//! A sequence request asks for many objects of one element type. The
//! recipe either carries an explicit ordered list of child recipes or
//! defers to "all registered instances of the element type". Either
//! way the result preserves registration order.

use std::sync::Arc;

use crate::build::{BuildError, BuildSession};
use crate::core::TypeKey;
use crate::instance::{DependencyEdge, Instance, InstanceMeta, Interceptor, SharedObject};
use crate::util::InternedString;

enum Elements {
    /// Explicit child recipes, built in order
    Explicit(Vec<Arc<dyn Instance>>),
    /// Every registered instance of the element family, in
    /// registration order
    AllRegistered,
}

/// Builds a `Vec` of element objects.
pub struct SequenceInstance {
    meta: InstanceMeta,
    element: TypeKey,
    elements: Elements,
}

impl SequenceInstance {
    /// Sequence of explicit children.
    pub fn of(element: TypeKey, children: Vec<Arc<dyn Instance>>) -> Self {
        SequenceInstance {
            meta: InstanceMeta::anonymous("seq"),
            element,
            elements: Elements::Explicit(children),
        }
    }

    /// Sequence of every registered instance of the element type.
    pub fn all_of(element: TypeKey) -> Self {
        SequenceInstance {
            meta: InstanceMeta::anonymous("seq"),
            element,
            elements: Elements::AllRegistered,
        }
    }

    pub fn named(mut self, name: impl Into<InternedString>) -> Self {
        self.meta.set_name(name);
        self
    }

    pub fn element(&self) -> TypeKey {
        self.element
    }
}

impl Instance for SequenceInstance {
    fn name(&self) -> InternedString {
        self.meta.name()
    }

    fn returned_type(&self) -> Option<TypeKey> {
        Some(TypeKey::sequence_of(self.element))
    }

    fn build(
        &self,
        _plugin_type: TypeKey,
        session: &mut BuildSession<'_>,
    ) -> Result<SharedObject, BuildError> {
        let items = match &self.elements {
            Elements::Explicit(children) => {
                let mut items = Vec::with_capacity(children.len());
                for child in children {
                    items.push(session.build_instance(self.element, child)?);
                }
                items
            }
            Elements::AllRegistered => session.resolve_all(self.element)?,
        };

        Ok(SharedObject::from_box(
            Box::new(items),
            TypeKey::sequence_of(self.element),
        ))
    }

    fn describe(&self) -> String {
        match &self.elements {
            Elements::Explicit(children) => {
                format!("sequence of {} explicit {}", children.len(), self.element)
            }
            Elements::AllRegistered => format!("all registered {}", self.element),
        }
    }

    fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        self.meta.interceptors()
    }

    fn dependencies(&self) -> Vec<DependencyEdge> {
        match &self.elements {
            Elements::Explicit(children) => children
                .iter()
                .map(|c| DependencyEdge {
                    param: c.name(),
                    ty: self.element,
                    inline: true,
                })
                .collect(),
            Elements::AllRegistered => vec![DependencyEdge {
                param: InternedString::new("*"),
                ty: self.element,
                inline: false,
            }],
        }
    }
}
