//! Partitions actors across N render tasks and schedules them on the
//! thread pool so that at most one task per command pool runs at once.

use std::sync::{Arc, Mutex};

use crate::core::handle::Handle;
use crate::core::thread_pool::{TaskGraph, ThreadPool};

use super::command_buffer::{CommandBuffer, LayoutTransition};
use super::framebuffer::Framebuffer;
use super::render_object::Actor;
use super::renderer::{Renderer, COMMAND_POOL_COUNT};

/// Splits `actors` into `task_count` contiguous slices, the last absorbing
/// the remainder, builds one [`CommandBuffer`] per slice against command
/// pool `i mod poolCount`, wires task `i`'s dependency on task
/// `i - poolCount` (so no two tasks sharing a pool ever record
/// concurrently), and records them on the renderer's thread pool.
///
/// Returns the command buffers in submission order (0..task_count); the
/// caller submits them in that order so GPU-side semaphore waits line up
/// with the declared dependencies.
#[allow(clippy::too_many_arguments)]
pub fn generate_command_buffers_parallel(
    renderer: &Arc<Mutex<Renderer>>,
    thread_pool: &ThreadPool,
    name: &str,
    framebuffer: Option<Handle<Framebuffer>>,
    clear_color: Option<[f32; 4]>,
    actors: &[Handle<Actor>],
    pass_name: &str,
    signal_semaphore: Option<Arc<vulkano::sync::semaphore::Semaphore>>,
    dependencies: &[Arc<vulkano::sync::semaphore::Semaphore>],
    layout_transitions: Vec<LayoutTransition>,
    task_count: usize,
) -> Vec<Arc<Mutex<CommandBuffer>>> {
    assert!(task_count >= 1, "need at least one render task");

    let actors_per_task = actors.len() / task_count;
    let slices: Vec<Vec<Handle<Actor>>> = (0..task_count)
        .map(|i| {
            let start = i * actors_per_task;
            let end = if i == task_count - 1 {
                actors.len()
            } else {
                start + actors_per_task
            };
            actors[start..end].to_vec()
        })
        .collect();

    let device = renderer.lock().unwrap().device();
    let command_buffers: Vec<Arc<Mutex<CommandBuffer>>> = (0..task_count)
        .map(|i| {
            let pool_index = i % COMMAND_POOL_COUNT;
            let extra_signal = (i == task_count - 1).then(|| signal_semaphore.clone()).flatten();
            Arc::new(Mutex::new(CommandBuffer::new(
                device.clone(),
                format!("{name}[{i}]"),
                pool_index,
                extra_signal,
            )))
        })
        .collect();

    let mut graph = TaskGraph::new();
    let layout_transitions = Arc::new(layout_transitions);
    let dependency_semaphores = Arc::new(dependencies.to_vec());

    for i in 0..task_count {
        let command_buffer = command_buffers[i].clone();
        let slice = slices[i].clone();
        let pass_name = pass_name.to_string();
        let is_first = i == 0;
        let transitions = layout_transitions.clone();
        let renderer = renderer.clone();

        let deps: Vec<usize> = if i >= COMMAND_POOL_COUNT {
            vec![i - COMMAND_POOL_COUNT]
        } else {
            vec![]
        };

        let first_task_dependencies = (i == 0).then(|| (*dependency_semaphores).clone());

        graph.push(
            move || {
                let mut cb = command_buffer.lock().unwrap();
                cb.set_frame_buffer(framebuffer);
                if let Some(deps) = first_task_dependencies {
                    cb.set_dependency_semaphores(deps);
                }
                if is_first {
                    if let Some(color) = clear_color {
                        cb.clear_render_targets(color);
                    }
                    if !transitions.is_empty() {
                        cb.change_layout((*transitions).clone());
                    }
                }
                cb.render(&slice, &pass_name);
                let mut renderer = renderer.lock().unwrap();
                let _ = cb.submit(&mut renderer);
            },
            &deps,
        );
    }

    thread_pool.submit_graph(graph);
    thread_pool.wait_for_completion();

    command_buffers
}

#[cfg(test)]
mod tests {
    #[test]
    fn partition_assigns_remainder_to_last_task() {
        let actor_count = 10usize;
        let task_count = 3usize;
        let per_task = actor_count / task_count;
        let mut total = 0;
        for i in 0..task_count {
            let start = i * per_task;
            let end = if i == task_count - 1 {
                actor_count
            } else {
                start + per_task
            };
            total += end - start;
        }
        assert_eq!(total, actor_count);
        // last task: 10/3 = 3 per task, first two get 3, last gets 4
        assert_eq!(per_task, 3);
        let last_start = 2 * per_task;
        assert_eq!(actor_count - last_start, 4);
    }

    #[test]
    fn task_i_depends_on_task_i_minus_pool_count() {
        const POOL_COUNT: usize = 8;
        let task_count = 20usize;
        let deps: Vec<Vec<usize>> = (0..task_count)
            .map(|i| if i >= POOL_COUNT { vec![i - POOL_COUNT] } else { vec![] })
            .collect();
        assert!(deps[0].is_empty());
        assert!(deps[7].is_empty());
        assert_eq!(deps[8], vec![0]);
        assert_eq!(deps[19], vec![11]);
    }
}
