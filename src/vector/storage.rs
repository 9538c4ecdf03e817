//! Ownership-tagged value storage for [`DoubleVector`](super::DoubleVector).

use std::ptr::NonNull;

/// Backing buffer of a vector: either owned, or a caller-supplied buffer that
/// is released on drop only when `delete_external_values` is set.
#[derive(Debug)]
pub enum Storage {
    Owned(Vec<f64>),
    External {
        ptr: NonNull<f64>,
        len: usize,
        delete_external_values: bool,
    },
}

impl Storage {
    /// Wraps caller memory.
    ///
    /// # Safety
    /// `ptr` must be valid for reads and writes of `len` values for as long as
    /// the storage lives, and must not be accessed through any other path in
    /// that time. If `delete_external_values` is true the buffer must come
    /// from `Box::<[f64]>::into_raw` with exactly `len` elements; ownership
    /// passes to the storage.
    pub unsafe fn external(ptr: NonNull<f64>, len: usize, delete_external_values: bool) -> Self {
        Storage::External { ptr, len, delete_external_values }
    }

    pub fn len(&self) -> usize {
        match self {
            Storage::Owned(v) => v.len(),
            Storage::External { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, Storage::Owned(_))
    }

    pub fn as_slice(&self) -> &[f64] {
        match self {
            Storage::Owned(v) => v,
            // SAFETY: validity for `len` values is the constructor's contract.
            Storage::External { ptr, len, .. } => unsafe {
                std::slice::from_raw_parts(ptr.as_ptr(), *len)
            },
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        match self {
            Storage::Owned(v) => v,
            // SAFETY: as above, plus exclusive access through `&mut self`.
            Storage::External { ptr, len, .. } => unsafe {
                std::slice::from_raw_parts_mut(ptr.as_ptr(), *len)
            },
        }
    }
}

impl Default for Storage {
    fn default() -> Self {
        Storage::Owned(Vec::new())
    }
}

impl Clone for Storage {
    // always deep-copies into owned memory
    fn clone(&self) -> Self {
        Storage::Owned(self.as_slice().to_vec())
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        if let Storage::External { ptr, len, delete_external_values: true } = *self {
            // SAFETY: the constructor requires a `Box<[f64]>` of `len` values
            // when deletion is requested.
            unsafe {
                drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(ptr.as_ptr(), len)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn borrowed_buffer_survives_drop() {
        let mut buf = [1.0, 2.0, 3.0];
        {
            let ptr = NonNull::new(buf.as_mut_ptr()).unwrap();
            let mut s = unsafe { Storage::external(ptr, 3, false) };
            s.as_mut_slice()[1] = 5.0;
            assert!(!s.is_owned());
        }
        assert_eq!(buf, [1.0, 5.0, 3.0]);
    }

    #[test]
    fn adopted_buffer_is_released() {
        let boxed: Box<[f64]> = vec![4.0; 4].into_boxed_slice();
        let raw = Box::into_raw(boxed) as *mut f64;
        let s = unsafe { Storage::external(NonNull::new(raw).unwrap(), 4, true) };
        assert_eq!(s.as_slice(), &[4.0; 4]);
        let copy = s.clone();
        drop(s);
        assert!(copy.is_owned());
        assert_eq!(copy.as_slice(), &[4.0; 4]);
    }
}
