pub mod core;
pub mod error;
pub mod render;
pub mod shader;
mod vertex_data;
pub mod vulkano_objects;

pub use vertex_data::{Vertex2d, Vertex3d, VertexFull};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::handle::PackedFreelist;

    #[test]
    fn freelist_roundtrips_a_value() {
        let mut freelist: PackedFreelist<u32> = PackedFreelist::new();
        let handle = freelist.add(7);
        assert_eq!(freelist.get(handle), Some(&7));
    }
}
