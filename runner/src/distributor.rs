use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{threads_per_task} threads per task do not fit on a node with {max_threads_per_node} threads")]
pub struct CapacityError {
    pub max_threads_per_node: usize,
    pub threads_per_task: usize,
}

/// number of tasks a single node can hold at once
pub fn jobs_per_node(
    max_threads_per_node: usize,
    threads_per_task: usize,
) -> Result<usize, CapacityError> {
    match max_threads_per_node.checked_div(threads_per_task) {
        Some(count) if count > 0 => Ok(count),
        _ => Err(CapacityError {
            max_threads_per_node,
            threads_per_task,
        }),
    }
}

/// Spread `n_tasks` over as few nodes as the capacity allows, then balance them:
/// every node gets `n_tasks / n_nodes`, the first `n_tasks % n_nodes` nodes one more.
pub fn distribute(
    n_tasks: usize,
    max_threads_per_node: usize,
    threads_per_task: usize,
) -> Result<Vec<usize>, CapacityError> {
    let per_node = jobs_per_node(max_threads_per_node, threads_per_task)?;

    if n_tasks == 0 {
        return Ok(Vec::new());
    }

    let n_nodes = n_tasks.div_ceil(per_node);
    let (base, remainder) = (n_tasks / n_nodes, n_tasks % n_nodes);

    debug!(n_tasks, n_nodes, per_node, "Distributing tasks over nodes");

    Ok((0..n_nodes)
        .map(|node| if node < remainder { base + 1 } else { base })
        .collect())
}
