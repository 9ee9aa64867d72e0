//! The trait every domain object participating in the pipeline implements.

use core::any::Any;

use crate::bookmark::Bookmark;

/// A live domain object.
///
/// The pipeline never inspects objects directly; it only needs their identity
/// (to turn them into bookmarks) and the ability to copy them into a unit of work.
/// Typed access happens inside metamodel handlers through [`downcast_ref`] /
/// [`downcast_mut`].
pub trait DomainObject: Any + Send + Sync + core::fmt::Debug {
    /// Logical type name, matching the type's registration in the metamodel.
    fn object_type(&self) -> &str;

    /// Identifier unique within `object_type`.
    fn object_id(&self) -> String;

    /// Deep copy used by units of work (working copies are mutated, never the stored original).
    fn clone_object(&self) -> Box<dyn DomainObject>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn bookmark(&self) -> Bookmark {
        Bookmark::new(self.object_type(), self.object_id())
    }
}

pub fn downcast_ref<T: DomainObject>(object: &dyn DomainObject) -> Option<&T> {
    object.as_any().downcast_ref::<T>()
}

pub fn downcast_mut<T: DomainObject>(object: &mut dyn DomainObject) -> Option<&mut T> {
    object.as_any_mut().downcast_mut::<T>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Widget {
        code: String,
        clicks: u32,
    }

    impl DomainObject for Widget {
        fn object_type(&self) -> &str {
            "Widget"
        }

        fn object_id(&self) -> String {
            self.code.clone()
        }

        fn clone_object(&self) -> Box<dyn DomainObject> {
            Box::new(self.clone())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[derive(Debug, Clone)]
    struct Gadget;

    impl DomainObject for Gadget {
        fn object_type(&self) -> &str {
            "Gadget"
        }

        fn object_id(&self) -> String {
            "g".to_string()
        }

        fn clone_object(&self) -> Box<dyn DomainObject> {
            Box::new(self.clone())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn bookmark_is_derived_from_type_and_id() {
        let widget = Widget {
            code: "W-1".to_string(),
            clicks: 0,
        };
        assert_eq!(widget.bookmark(), Bookmark::new("Widget", "W-1"));
    }

    #[test]
    fn downcast_to_the_concrete_type() {
        let mut boxed: Box<dyn DomainObject> = Box::new(Widget {
            code: "W-1".to_string(),
            clicks: 0,
        });

        downcast_mut::<Widget>(boxed.as_mut()).unwrap().clicks += 1;

        assert_eq!(downcast_ref::<Widget>(boxed.as_ref()).unwrap().clicks, 1);
        assert!(downcast_ref::<Gadget>(boxed.as_ref()).is_none());
    }

    #[test]
    fn clones_are_independent() {
        let original = Widget {
            code: "W-1".to_string(),
            clicks: 0,
        };
        let mut copy = original.clone_object();
        downcast_mut::<Widget>(copy.as_mut()).unwrap().clicks = 5;
        assert_eq!(original.clicks, 0);
    }
}
