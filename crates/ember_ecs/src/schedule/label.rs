//! Value-typed labels derived from user types.
//!
//! Labels are `(TypeId, name)` pairs: equality and hashing are O(1) on the
//! type identity alone, so two labels made from the same type are always the
//! same label, stable across runs of the same build.

/// Defines a label value type plus its conversion trait.
///
/// The conversion trait has a blanket default, so a unit struct opts in with
/// an empty `impl` block:
///
/// ```
/// use ember_ecs::schedule::AsScheduleLabel;
///
/// struct Update;
/// impl AsScheduleLabel for Update {}
/// ```
#[macro_export]
macro_rules! define_label {
    (
        $(#[$label_meta:meta])*
        $label:ident,
        $(#[$trait_meta:meta])*
        $trait_name:ident,
        $method:ident
    ) => {
        $(#[$label_meta])*
        #[derive(Clone, Copy)]
        pub struct $label {
            type_id: ::core::any::TypeId,
            /// 0 for type-derived labels; anonymous labels count up from 1.
            disambiguator: u32,
            name: &'static str,
        }

        impl $label {
            /// The label of type `T`.
            pub fn of<T: 'static>() -> Self {
                Self {
                    type_id: ::core::any::TypeId::of::<T>(),
                    disambiguator: 0,
                    name: ::core::any::type_name::<T>(),
                }
            }

            /// A fresh label equal only to copies of itself.
            pub fn anonymous(name: &'static str) -> Self {
                static COUNTER: ::core::sync::atomic::AtomicU32 =
                    ::core::sync::atomic::AtomicU32::new(1);
                Self {
                    type_id: ::core::any::TypeId::of::<()>(),
                    disambiguator: COUNTER
                        .fetch_add(1, ::core::sync::atomic::Ordering::Relaxed),
                    name,
                }
            }

            /// Short name of the underlying type, for diagnostics.
            pub fn name(&self) -> &'static str {
                self.name.rsplit("::").next().unwrap_or(self.name)
            }

            /// Full path of the underlying type.
            pub fn type_name(&self) -> &'static str {
                self.name
            }
        }

        impl ::core::cmp::PartialEq for $label {
            fn eq(&self, other: &Self) -> bool {
                self.type_id == other.type_id && self.disambiguator == other.disambiguator
            }
        }

        impl ::core::cmp::Eq for $label {}

        impl ::core::hash::Hash for $label {
            fn hash<H: ::core::hash::Hasher>(&self, state: &mut H) {
                self.type_id.hash(state);
                self.disambiguator.hash(state);
            }
        }

        impl ::core::fmt::Debug for $label {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.name())
            }
        }

        $(#[$trait_meta])*
        pub trait $trait_name: Sized + 'static {
            fn $method(&self) -> $label {
                $label::of::<Self>()
            }
        }

        impl $trait_name for $label {
            fn $method(&self) -> $label {
                *self
            }
        }
    };
}

define_label!(
    /// Identifies a [`Schedule`](crate::schedule::Schedule).
    ScheduleLabel,
    /// Types usable where a [`ScheduleLabel`] is expected.
    AsScheduleLabel,
    as_schedule_label
);

define_label!(
    /// Identifies a system set node inside a schedule.
    SystemSetLabel,
    /// Types usable where a [`SystemSetLabel`] is expected.
    AsSystemSetLabel,
    as_system_set_label
);

define_label!(
    /// Identifies an executor pool.
    ExecutorLabel,
    /// Types usable where an [`ExecutorLabel`] is expected.
    AsExecutorLabel,
    as_executor_label
);

/// Anything orderable against: a set label directly, or a system function
/// (whose set label is derived from its type).
///
/// The marker parameter disambiguates the two blanket impls.
pub trait IntoSystemSetLabel<Marker> {
    fn into_system_set_label(self) -> SystemSetLabel;
}

/// [`IntoSystemSetLabel`] marker for label-like types.
pub struct IsSetLabel;

/// [`IntoSystemSetLabel`] marker for system functions.
pub struct IsSystemFunction;

impl<S: AsSystemSetLabel> IntoSystemSetLabel<IsSetLabel> for S {
    fn into_system_set_label(self) -> SystemSetLabel {
        self.as_system_set_label()
    }
}

impl<Marker, F> IntoSystemSetLabel<(IsSystemFunction, Marker)> for F
where
    F: crate::system::IntoSystem<Marker> + 'static,
{
    fn into_system_set_label(self) -> SystemSetLabel {
        SystemSetLabel::of::<F>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Update;
    impl AsScheduleLabel for Update {}

    struct Physics;
    impl AsSystemSetLabel for Physics {}

    #[test]
    fn labels_compare_by_type_identity() {
        assert_eq!(Update.as_schedule_label(), ScheduleLabel::of::<Update>());
        assert_ne!(
            ScheduleLabel::of::<Update>(),
            ScheduleLabel::of::<Physics>()
        );
        assert_eq!(Physics.as_system_set_label().name(), "Physics");
    }

    #[test]
    fn system_functions_are_set_labels() {
        fn my_system() {}
        fn other_system() {}
        let a = my_system.into_system_set_label();
        let b = other_system.into_system_set_label();
        assert_ne!(a, b);
        assert_eq!(a, my_system.into_system_set_label());
    }
}
