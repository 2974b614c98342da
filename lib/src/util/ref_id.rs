use stable_deref_trait::StableDeref;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

/// Handle whose equality and hashing come from the address it points to, not from the data
/// behind it.
///
/// Metadata entries live in an arena for the whole analysis, so two handles name the same entry
/// exactly when they point at the same allocation. Two structurally identical signatures
/// declared under different names stay distinct.
#[derive(Debug)]
pub struct RefId<'a, T: ?Sized>(pub &'a T);

impl<'a, T: ?Sized> Clone for RefId<'a, T> {
    fn clone(&self) -> Self {
        RefId(self.0)
    }
}

impl<'a, T: ?Sized> Copy for RefId<'a, T> {}

impl<'a, T> Hash for RefId<'a, T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(self.0, state)
    }
}

impl<'a, 'b, T> PartialEq<RefId<'b, T>> for RefId<'a, T> {
    fn eq(&self, other: &RefId<'b, T>) -> bool {
        std::ptr::eq(self.0, other.0)
    }
}

impl<'a, T> Eq for RefId<'a, T> {}

impl<'a, T: ?Sized> Deref for RefId<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.0
    }
}

unsafe impl<'a, T: ?Sized> StableDeref for RefId<'a, T> {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn identity_is_by_address() {
        let first = String::from("same");
        let second = String::from("same");

        assert_eq!(RefId(&first), RefId(&first));
        assert_ne!(RefId(&first), RefId(&second));
        assert_eq!(*RefId(&first), *RefId(&second));
    }
}
