use thiserror::Error;

/// Parent index marking a root node.
pub const NO_PARENT: u8 = 0xFF;

#[derive(Debug, Error)]
pub enum NodeImportError {
	#[error("Parent index {parent} of node {node} out of range")]
	ParentRange {
		node: usize,
		parent: u8,
	},
	#[error("Skeleton parent chain of node {0} contains a cycle")]
	SkeletonCycle(usize),
}

/// One skeleton entry: which mesh object this bone drives and who its parent
/// is. Decorative objects with no bone use [`NO_PARENT`] as object too.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeEntry {
	pub object: u8,
	pub parent: u8,
}

/// Reads a flat 2-bytes-per-node skeleton table and validates it.
///
/// The on-disc table carries no structural guarantees, so parent indices are
/// range checked and the parent chains walked for cycles before anything
/// downstream trusts them.
pub fn read_nodes(buffer: &[u8]) -> Result<Vec<NodeEntry>, NodeImportError> {
	let mut nodes = Vec::with_capacity(buffer.len() / 2);

	for pair in buffer.chunks_exact(2) {
		nodes.push(NodeEntry {
			object: pair[0],
			parent: pair[1],
		});
	}

	for (i, node) in nodes.iter().enumerate() {
		if node.parent != NO_PARENT && node.parent as usize >= nodes.len() {
			return Err(NodeImportError::ParentRange {
				node: i,
				parent: node.parent,
			});
		}
	}

	for start in 0..nodes.len() {
		let mut current = start;
		let mut steps = 0;

		while nodes[current].parent != NO_PARENT {
			current = nodes[current].parent as usize;
			steps += 1;

			if steps > nodes.len() {
				return Err(NodeImportError::SkeletonCycle(start));
			}
		}
	}

	Ok(nodes)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_read_valid_chain() {
		let data = [0, NO_PARENT, 1, 0, 2, 1];
		let nodes = read_nodes(&data).unwrap();

		assert_eq!(3, nodes.len());
		assert_eq!(NodeEntry { object: 0, parent: NO_PARENT }, nodes[0]);
		assert_eq!(NodeEntry { object: 2, parent: 1 }, nodes[2]);
	}

	#[test]
	fn test_parent_out_of_range() {
		let data = [0, NO_PARENT, 1, 9];
		assert!(matches!(read_nodes(&data), Err(NodeImportError::ParentRange { node: 1, parent: 9 })));
	}

	#[test]
	fn test_cycle_detected() {
		// 1 -> 2 -> 1
		let data = [0, NO_PARENT, 1, 2, 2, 1];
		assert!(matches!(read_nodes(&data), Err(NodeImportError::SkeletonCycle(_))));
	}

	#[test]
	fn test_self_parent_is_a_cycle() {
		let data = [0, 0];
		assert!(matches!(read_nodes(&data), Err(NodeImportError::SkeletonCycle(0))));
	}
}
