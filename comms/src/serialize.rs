/// Writes a value into the outgoing frame buffer.
pub trait Serialize<'a> {
    /// Appends the serialized form of `self` into `buf`.
    ///
    /// # Arguments
    /// * `buf` - The frame buffer, already holding the length prefix.
    ///
    /// # Returns
    /// An optional borrowed tail that is written right after `buf` without copying it.
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]>;
}
