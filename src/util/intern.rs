use std::{collections::HashMap, fmt, hash::Hash, marker::PhantomData, num::NonZeroU32, rc::Rc};

/// A handle to a value of type `T` stored in an [`Interner`]. Handles are
/// `Copy`, so tokens can carry their file name around for free.
pub struct Interned<T: ?Sized> {
    // Non-zero so that `Option<Interned<T>>` stays four bytes wide.
    handle: NonZeroU32,
    _ty: PhantomData<T>,
}

impl<T: ?Sized> Interned<T> {
    const fn new(handle: NonZeroU32) -> Self {
        Interned {
            handle,
            _ty: PhantomData,
        }
    }

    fn index(self) -> usize {
        self.handle.get() as usize - 1
    }
}

impl<T: ?Sized> Copy for Interned<T> {}

impl<T: ?Sized> Clone for Interned<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Hash for Interned<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.handle.hash(state);
    }
}

impl<T: ?Sized> PartialEq for Interned<T> {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl<T: ?Sized> Eq for Interned<T> {}

impl<T: ?Sized> fmt::Debug for Interned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Interned({})", self.handle)
    }
}

/// Deduplicating storage, used for the names of source files.
pub struct Interner<T: ?Sized> {
    map: HashMap<Rc<T>, NonZeroU32>,
    vec: Vec<Rc<T>>,
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Interner<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.vec.iter().enumerate().map(|(i, value)| (i + 1, value)))
            .finish()
    }
}

impl<T: ?Sized> Interner<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Interner {
            map: HashMap::with_capacity(capacity),
            vec: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.vec.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vec.is_empty()
    }

    /// Interns the provided value, returning a handle which can be used to
    /// retrieve it later. Interning an equal value again returns the same
    /// handle.
    pub fn intern(&mut self, value: &T) -> Interned<T>
    where
        T: Eq + Hash + ToOwned,
        T::Owned: Into<Rc<T>>,
    {
        if let Some(&handle) = self.map.get(value) {
            return Interned::new(handle);
        }
        let handle = u32::try_from(self.vec.len() + 1)
            .ok()
            .and_then(NonZeroU32::new)
            .unwrap_or(NonZeroU32::MAX);
        let key: Rc<T> = value.to_owned().into();
        self.vec.push(Rc::clone(&key));
        self.map.insert(key, handle);
        Interned::new(handle)
    }

    /// Returns the value behind `handle`. Panics if the handle comes from
    /// another interner.
    pub fn get(&self, handle: Interned<T>) -> &T {
        &self.vec[handle.index()]
    }
}
