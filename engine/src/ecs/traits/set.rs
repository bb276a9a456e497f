use crate::{
    all_tuples,
    ecs::{
        Trait,
        registry::{TraitId, TypeRegistry},
    },
};

/// Something a set of trait values can be written into.
pub trait TraitTarget {
    fn apply<T: Trait>(&mut self, id: TraitId, value: T);
}

/// A set of trait values, such as a single trait or a tuple of traits. Used for spawning subjects
/// with initial values and for building filters from a list of types.
pub trait TraitSet: Send + Sized + 'static {
    /// Register the set's trait types, appending their ids in declaration order.
    fn collect_ids(registry: &TypeRegistry, ids: &mut Vec<TraitId>);

    /// Move every value of the set into the target.
    fn apply<T: TraitTarget>(self, registry: &TypeRegistry, target: &mut T);

    /// The ids of the set's trait types.
    fn trait_ids(registry: &TypeRegistry) -> Vec<TraitId> {
        let mut ids = Vec::new();
        Self::collect_ids(registry, &mut ids);
        ids
    }
}

impl<C: Trait> TraitSet for C {
    fn collect_ids(registry: &TypeRegistry, ids: &mut Vec<TraitId>) {
        ids.push(registry.trait_id::<C>());
    }

    fn apply<T: TraitTarget>(self, registry: &TypeRegistry, target: &mut T) {
        target.apply::<C>(registry.trait_id::<C>(), self);
    }
}

impl TraitSet for () {
    fn collect_ids(_registry: &TypeRegistry, _ids: &mut Vec<TraitId>) {}

    fn apply<T: TraitTarget>(self, _registry: &TypeRegistry, _target: &mut T) {}
}

macro_rules! tuple_set {
    ($($name: ident),*) => {
        impl<$($name: TraitSet),*> TraitSet for ($($name,)*) {
            fn collect_ids(registry: &TypeRegistry, ids: &mut Vec<TraitId>) {
                $(<$name as TraitSet>::collect_ids(registry, ids);)*
            }

            fn apply<CT: TraitTarget>(self, registry: &TypeRegistry, target: &mut CT) {
                #[allow(non_snake_case)]
                let ( $($name,)* ) = self;
                $(<$name as TraitSet>::apply($name, registry, target);)*
            }
        }
    }
}

all_tuples!(tuple_set);
