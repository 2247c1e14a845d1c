//! Transform hierarchy: local TRS matrices plus parent links, recomputed into
//! world matrices in topological order whenever the hierarchy changes.

use cgmath::Matrix4;

use super::handle::{Handle, PackedFreelist};

pub struct TransformManager {
    local: PackedFreelist<Matrix4<f32>>,
    parent: Vec<Handle<Matrix4<f32>>>,
    world: Vec<Matrix4<f32>>,
    hierarchy_changed: bool,
}

impl Default for TransformManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformManager {
    pub fn new() -> Self {
        TransformManager {
            local: PackedFreelist::new(),
            parent: Vec::new(),
            world: Vec::new(),
            hierarchy_changed: false,
        }
    }

    pub fn create_transform(&mut self, local: Matrix4<f32>) -> Handle<Matrix4<f32>> {
        let handle = self.local.add(local);
        self.parent.push(Handle::NULL);
        self.world.push(local);
        self.hierarchy_changed = true;
        handle
    }

    pub fn destroy_transform(&mut self, handle: Handle<Matrix4<f32>>) -> bool {
        let Some(index) = self.local.index_of(handle) else {
            return false;
        };
        // `local.remove` swaps the removed element with the last packed
        // element before popping; mirror that here so `parent`/`world`
        // stay aligned with `local`'s packed order.
        let last = self.local.len() - 1;
        self.parent.swap(index, last);
        self.world.swap(index, last);
        self.local.remove(handle);
        self.parent.pop();
        self.world.pop();
        self.hierarchy_changed = true;
        true
    }

    pub fn get_local(&self, handle: Handle<Matrix4<f32>>) -> Option<&Matrix4<f32>> {
        self.local.get(handle)
    }

    pub fn set_local(&mut self, handle: Handle<Matrix4<f32>>, local: Matrix4<f32>) -> bool {
        match self.local.get_mut(handle) {
            Some(slot) => {
                *slot = local;
                true
            }
            None => false,
        }
    }

    pub fn set_parent(&mut self, handle: Handle<Matrix4<f32>>, parent: Handle<Matrix4<f32>>) -> bool {
        if !self.local.contains(handle) {
            return false;
        }
        if !parent.is_null() && !self.local.contains(parent) {
            return false;
        }
        // packed index is stable until the next structural change, safe to index directly
        let index = self.index_of(handle);
        self.parent[index] = parent;
        self.hierarchy_changed = true;
        true
    }

    pub fn get_parent(&self, handle: Handle<Matrix4<f32>>) -> Option<Handle<Matrix4<f32>>> {
        if !self.local.contains(handle) {
            return None;
        }
        Some(self.parent[self.index_of(handle)])
    }

    /// Returns the most recently computed world matrix. Call [`update`] first
    /// if the hierarchy may have changed since the last call.
    pub fn get_world_matrix(&self, handle: Handle<Matrix4<f32>>) -> Option<&Matrix4<f32>> {
        if !self.local.contains(handle) {
            return None;
        }
        Some(&self.world[self.index_of(handle)])
    }

    fn index_of(&self, handle: Handle<Matrix4<f32>>) -> usize {
        self.local
            .index_of(handle)
            .expect("handle validated live by caller")
    }

    /// If the hierarchy changed since the last call, sorts transforms so
    /// parents precede children, then recomputes every world matrix in a
    /// single pass as `parent.world * local` (local, if no parent).
    pub fn update(&mut self) {
        if !self.hierarchy_changed {
            return;
        }

        let order = self.topological_order();
        for &index in &order {
            let parent = self.parent[index];
            let local = *self.local.get_by_index(index);
            self.world[index] = if parent.is_null() {
                local
            } else {
                let parent_index = self.index_of(parent);
                self.world[parent_index] * local
            };
        }

        self.hierarchy_changed = false;
    }

    /// Orders packed indices so that every parent appears before its
    /// children (Kahn's algorithm over the parent/child DAG).
    fn topological_order(&self) -> Vec<usize> {
        let n = self.local.len();
        let mut depth = vec![0u32; n];
        for i in 0..n {
            let mut d = 0;
            let mut cur = self.parent[i];
            while !cur.is_null() {
                d += 1;
                cur = self.parent[self.index_of(cur)];
            }
            depth[i] = d;
        }
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by_key(|&i| depth[i]);
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::SquareMatrix;

    fn translate(x: f32, y: f32, z: f32) -> Matrix4<f32> {
        Matrix4::from_translation(cgmath::vec3(x, y, z))
    }

    #[test]
    fn root_transform_world_equals_local_without_parent() {
        let mut tm = TransformManager::new();
        let h = tm.create_transform(translate(1.0, 0.0, 0.0));
        tm.update();
        assert_eq!(*tm.get_world_matrix(h).unwrap(), translate(1.0, 0.0, 0.0));
    }

    #[test]
    fn child_world_is_parent_world_times_local() {
        let mut tm = TransformManager::new();
        let root = tm.create_transform(translate(1.0, 0.0, 0.0));
        let child = tm.create_transform(translate(0.0, 1.0, 0.0));
        tm.set_parent(child, root);
        tm.update();
        assert_eq!(*tm.get_world_matrix(child).unwrap(), translate(1.0, 1.0, 0.0));

        tm.set_local(root, translate(2.0, 0.0, 0.0));
        tm.update();
        assert_eq!(*tm.get_world_matrix(child).unwrap(), translate(2.0, 1.0, 0.0));
    }

    #[test]
    fn update_is_noop_without_dirty_flag() {
        let mut tm = TransformManager::new();
        let h = tm.create_transform(Matrix4::identity());
        tm.update();
        // Mutate local without going through set_local/set_parent: world must
        // not change until the hierarchy is marked dirty again.
        *tm.local.get_mut(h).unwrap() = translate(5.0, 0.0, 0.0);
        tm.update();
        assert_eq!(*tm.get_world_matrix(h).unwrap(), Matrix4::identity());
    }
}
