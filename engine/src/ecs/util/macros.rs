/// Implement another macro for tuples of types recursively.
#[macro_export]
macro_rules! for_every_tuple {
    ($m:ident !! $head_ty:ident) => {
        $m!($head_ty);
    };
    ($m:ident !! $head_ty:ident, $($tail_ty:ident),*) => (
        $m!($head_ty, $( $tail_ty ),*);
        $crate::for_every_tuple!($m !! $( $tail_ty ),*);
    );
}

/// Apply a macro to all tuple arities from one to sixteen elements.
#[macro_export]
macro_rules! all_tuples {
    ($m:ident) => {
        $crate::for_every_tuple!($m !! A, B, C, D, E, F, G, H, I, J, K, L, M, N, O, P);
    };
}

#[cfg(test)]
mod tests {
    use std::marker::PhantomData;

    struct Arity<Params>(PhantomData<Params>);

    macro_rules! arity_impl {
         ($($name: ident),*) => {
            #[allow(dead_code)]
            impl<$($name),*> Arity<($($name,)*)> {
                pub fn arity(&self) -> usize {
                    [$(stringify!($name)),*].len()
                 }
            }
        }
    }

    all_tuples!(arity_impl);

    #[test]
    fn expands_every_arity() {
        // Given
        let single = Arity::<(u8,)>(PhantomData);
        let widest = Arity::<(
            u8,
            u8,
            u8,
            u8,
            u8,
            u8,
            u8,
            u8,
            u8,
            u8,
            u8,
            u8,
            u8,
            u8,
            u8,
            u8,
        )>(PhantomData);

        // Then
        assert_eq!(single.arity(), 1);
        assert_eq!(widest.arity(), 16);
    }
}
