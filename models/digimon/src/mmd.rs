use std::io;
use thiserror::Error;

use dwt_core::cursor::ByteCursor;

use crate::anim::Axis;

#[derive(Debug, Error)]
pub enum MMDImportError {
	#[error("I/O error")]
	IO {
		#[from]
		source: io::Error,
	},
	#[error("Loop started at instruction {0} before the previous loop ended")]
	NestedLoop(usize),
	#[error("Unknown animation instruction: {0:#06x}")]
	UnknownInstruction(u16),
}

/// MMD container header: a TMD mesh and an MTN animation block, both at
/// offsets from the start of the file.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MmdHeader {
	pub tmd_offset: u32,
	pub mtn_offset: u32,
}

impl MmdHeader {
	#[cfg(feature = "import")]
	pub fn read(cursor: &mut ByteCursor) -> io::Result<MmdHeader> {
		Ok(MmdHeader {
			tmd_offset: cursor.read_u32()?,
			mtn_offset: cursor.read_u32()?,
		})
	}
}

/// A bone's rest transform at the start of an animation. Raw fixed point;
/// axis scaling happens during baking.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
	pub scale_x: i16,
	pub scale_y: i16,
	pub scale_z: i16,
	pub rot_x: i16,
	pub rot_y: i16,
	pub rot_z: i16,
	pub pos_x: i16,
	pub pos_y: i16,
	pub pos_z: i16,
}

impl Default for Pose {
	fn default() -> Pose {
		Pose {
			scale_x: 0x1000,
			scale_y: 0x1000,
			scale_z: 0x1000,
			rot_x: 0,
			rot_y: 0,
			rot_z: 0,
			pos_x: 0,
			pos_y: 0,
			pos_z: 0,
		}
	}
}

/// One keyframe target: a node and its new per-frame deltas, already divided
/// by the entry's shared scale.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyframeEntry {
	pub node: u8,
	pub values: Vec<(Axis, f32)>,
}

impl KeyframeEntry {
	#[cfg(feature = "import")]
	fn read(cursor: &mut ByteCursor) -> io::Result<KeyframeEntry> {
		let instruction = cursor.read_u16()?;
		let node = (instruction & 0x3F) as u8;
		let enabled_axes = (instruction & 0x7FC0) >> 6;
		// a zero divisor would turn every delta infinite
		let scale = cursor.read_u16()?.max(1);

		// bit 8 down to bit 0 maps onto SCALE_X through POS_Z
		let mut values = vec![];
		for i in (0..=8u16).rev() {
			if enabled_axes & (1 << i) == 0 {
				continue;
			}

			let raw = cursor.read_i16()?;
			values.push((Axis::from_index((8 - i) as u8), raw as f32 / scale as f32));
		}

		Ok(KeyframeEntry {
			node: node,
			values: values,
		})
	}
}

/// One decoded animation opcode. The top nibble of the 16-bit word selects
/// the kind; the bottom 12 bits carry a frame timecode where one applies.
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
	Keyframe {
		timecode: u16,
		entries: Vec<KeyframeEntry>,
	},
	LoopStart {
		count: u8,
	},
	LoopEnd {
		timecode: u16,
		new_time: u16,
	},
	ChangeTexture {
		timecode: u16,
		src_x: u8,
		src_y: u8,
		dest_x: u8,
		dest_y: u8,
		width: u8,
		height: u8,
	},
	PlaySound {
		timecode: u16,
		sound_id: u8,
		vab_id: u8,
	},
}

/// A raw animation as stored in the MTN block: rest poses for every bone but
/// the root, then an instruction stream up to a zero terminator.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MmdAnimation {
	pub frame_count: u16,
	pub poses: Vec<Pose>,
	pub instructions: Vec<Instruction>,
}

impl MmdAnimation {
	#[cfg(feature = "import")]
	pub fn read(cursor: &mut ByteCursor, bone_count: usize) -> Result<MmdAnimation, MMDImportError> {
		let raw_count = cursor.read_u16()?;
		let has_scale = raw_count & 0x8000 != 0;
		let frame_count = raw_count & 0x7FFF;

		// the root bone keeps its identity rest pose
		let mut poses = vec![Pose::default()];

		for _ in 1..bone_count {
			let mut pose = Pose::default();
			if has_scale {
				pose.scale_x = cursor.read_i16()?;
				pose.scale_y = cursor.read_i16()?;
				pose.scale_z = cursor.read_i16()?;
			}
			pose.rot_x = cursor.read_i16()?;
			pose.rot_y = cursor.read_i16()?;
			pose.rot_z = cursor.read_i16()?;
			pose.pos_x = cursor.read_i16()?;
			pose.pos_y = cursor.read_i16()?;
			pose.pos_z = cursor.read_i16()?;

			poses.push(pose);
		}

		let mut instructions = vec![];
		let mut in_loop = false;

		loop {
			let instruction = cursor.read_u16()?;
			if instruction == 0x0000 {
				break;
			}

			let timecode = instruction & 0x0FFF;

			match instruction & 0xF000 {
				0x0000 => {
					let mut entries = vec![];
					while cursor.peek_u16()? & 0x8000 != 0 {
						entries.push(KeyframeEntry::read(cursor)?);
					}

					instructions.push(Instruction::Keyframe {
						timecode: timecode,
						entries: entries,
					});
				},
				0x1000 => {
					// a second loop region may not open before the first closes
					if in_loop {
						return Err(MMDImportError::NestedLoop(instructions.len()));
					}
					in_loop = true;

					instructions.push(Instruction::LoopStart {
						count: (instruction & 0x00FF) as u8,
					});
				},
				0x2000 => {
					in_loop = false;

					instructions.push(Instruction::LoopEnd {
						timecode: timecode,
						new_time: cursor.read_u16()?,
					});
				},
				0x3000 => {
					let src_y = cursor.read_u8()?;
					let src_x = cursor.read_u8()?;
					let height = cursor.read_u8()?;
					let width = cursor.read_u8()?;
					let dest_y = cursor.read_u8()?;
					let dest_x = cursor.read_u8()?;

					instructions.push(Instruction::ChangeTexture {
						timecode: timecode,
						src_x: src_x,
						src_y: src_y,
						dest_x: dest_x,
						dest_y: dest_y,
						width: width,
						height: height,
					});
				},
				0x4000 => {
					instructions.push(Instruction::PlaySound {
						timecode: timecode,
						sound_id: cursor.read_u8()?,
						vab_id: cursor.read_u8()?,
					});
				},
				_ => return Err(MMDImportError::UnknownInstruction(instruction)),
			}
		}

		Ok(MmdAnimation {
			frame_count: frame_count,
			poses: poses,
			instructions: instructions,
		})
	}
}

/// Reads the animation bank of an MTN block: a table of offsets relative to
/// the block start, one per animation slot. The slot count is implied by the
/// first offset; zero offsets mark empty slots.
#[cfg(feature = "import")]
pub fn read_animations(buffer: &[u8], bone_count: usize) -> Result<Vec<MmdAnimation>, MMDImportError> {
	let mut cursor = ByteCursor::new(buffer);

	let count = cursor.peek_u32()? / 4;

	let mut offsets = Vec::with_capacity(count as usize);
	for _ in 0..count {
		offsets.push(cursor.read_u32()?);
	}

	let mut animations = vec![];
	for offset in offsets {
		if offset == 0 {
			animations.push(MmdAnimation::default());
		} else {
			cursor.set_position(offset as u64);
			animations.push(MmdAnimation::read(&mut cursor, bone_count)?);
		}
	}

	Ok(animations)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_read_poses_with_scale() {
		let mut data = vec![];
		data.extend_from_slice(&0x800Au16.to_le_bytes()); // 10 frames, scaled poses

		// one non-root bone
		for v in [100i16, 200, 300, 1, 2, 3, 4, 5, 6] {
			data.extend_from_slice(&v.to_le_bytes());
		}
		data.extend_from_slice(&0u16.to_le_bytes()); // terminator

		let mut cursor = ByteCursor::new(&data);
		let anim = MmdAnimation::read(&mut cursor, 2).unwrap();

		assert_eq!(10, anim.frame_count);
		assert_eq!(2, anim.poses.len());
		assert_eq!(Pose::default(), anim.poses[0]);
		assert_eq!(100, anim.poses[1].scale_x);
		assert_eq!(1, anim.poses[1].rot_x);
		assert_eq!(6, anim.poses[1].pos_z);
		assert!(anim.instructions.is_empty());
	}

	#[test]
	fn test_read_keyframe_entries() {
		let mut data = vec![];
		data.extend_from_slice(&5u16.to_le_bytes()); // frame count, no scale

		data.extend_from_slice(&0x0001u16.to_le_bytes()); // keyframe at frame 1
		// entry: node 1, POS_X only (axis 6 -> bit 2)
		data.extend_from_slice(&(0x8000u16 | (1 << 2) << 6 | 1).to_le_bytes());
		data.extend_from_slice(&10u16.to_le_bytes()); // scale
		data.extend_from_slice(&100i16.to_le_bytes());
		data.extend_from_slice(&0u16.to_le_bytes()); // terminator

		let mut cursor = ByteCursor::new(&data);
		let anim = MmdAnimation::read(&mut cursor, 1).unwrap();

		assert_eq!(1, anim.instructions.len());
		match &anim.instructions[0] {
			Instruction::Keyframe { timecode, entries } => {
				assert_eq!(1, *timecode);
				assert_eq!(1, entries.len());
				assert_eq!(1, entries[0].node);
				assert_eq!(vec![(Axis::PosX, 10.0)], entries[0].values);
			},
			other => panic!("expected keyframe, got {:?}", other),
		}
	}

	#[test]
	fn test_zero_scale_stays_finite() {
		let mut data = vec![];
		data.extend_from_slice(&5u16.to_le_bytes());

		data.extend_from_slice(&0x0001u16.to_le_bytes());
		// entry: node 1, POS_X only, scale 0
		data.extend_from_slice(&(0x8000u16 | (1 << 2) << 6 | 1).to_le_bytes());
		data.extend_from_slice(&0u16.to_le_bytes());
		data.extend_from_slice(&100i16.to_le_bytes());
		data.extend_from_slice(&0u16.to_le_bytes());

		let mut cursor = ByteCursor::new(&data);
		let anim = MmdAnimation::read(&mut cursor, 1).unwrap();

		match &anim.instructions[0] {
			Instruction::Keyframe { entries, .. } => {
				assert_eq!(vec![(Axis::PosX, 100.0)], entries[0].values);
			},
			other => panic!("expected keyframe, got {:?}", other),
		}
	}

	#[test]
	fn test_read_side_channel_instructions() {
		let mut data = vec![];
		data.extend_from_slice(&3u16.to_le_bytes());

		data.extend_from_slice(&0x4002u16.to_le_bytes()); // sound at frame 2
		data.push(7); // sound id
		data.push(1); // vab id
		data.extend_from_slice(&0x3001u16.to_le_bytes()); // texture at frame 1
		data.extend(&[10, 20, 8, 4, 30, 40]); // srcY srcX h w destY destX
		data.extend_from_slice(&0u16.to_le_bytes());

		let mut cursor = ByteCursor::new(&data);
		let anim = MmdAnimation::read(&mut cursor, 1).unwrap();

		assert_eq!(
			Instruction::PlaySound { timecode: 2, sound_id: 7, vab_id: 1 },
			anim.instructions[0]
		);
		assert_eq!(
			Instruction::ChangeTexture {
				timecode: 1,
				src_x: 20,
				src_y: 10,
				dest_x: 40,
				dest_y: 30,
				width: 4,
				height: 8,
			},
			anim.instructions[1]
		);
	}

	#[test]
	fn test_nested_loop_rejected() {
		let mut data = vec![];
		data.extend_from_slice(&8u16.to_le_bytes());
		data.extend_from_slice(&0x1002u16.to_le_bytes()); // loop start, count 2
		data.extend_from_slice(&0x1003u16.to_le_bytes()); // second loop start
		data.extend_from_slice(&0u16.to_le_bytes());

		let mut cursor = ByteCursor::new(&data);
		assert!(matches!(
			MmdAnimation::read(&mut cursor, 1),
			Err(MMDImportError::NestedLoop(1))
		));
	}

	#[test]
	fn test_sequential_loops_allowed() {
		let mut data = vec![];
		data.extend_from_slice(&8u16.to_le_bytes());
		data.extend_from_slice(&0x1002u16.to_le_bytes());
		data.extend_from_slice(&0x2004u16.to_le_bytes());
		data.extend_from_slice(&0u16.to_le_bytes()); // new time
		data.extend_from_slice(&0x1003u16.to_le_bytes());
		data.extend_from_slice(&0x2007u16.to_le_bytes());
		data.extend_from_slice(&4u16.to_le_bytes());
		data.extend_from_slice(&0u16.to_le_bytes());

		let mut cursor = ByteCursor::new(&data);
		let anim = MmdAnimation::read(&mut cursor, 1).unwrap();
		assert_eq!(4, anim.instructions.len());
	}

	#[test]
	fn test_animation_bank_offsets() {
		// the first offset doubles as the table size, so slot 0 points past
		// both table entries; slot 1 is empty
		let mut data = vec![];
		data.extend_from_slice(&8u32.to_le_bytes());
		data.extend_from_slice(&0u32.to_le_bytes());
		data.extend_from_slice(&2u16.to_le_bytes()); // frame count at offset 8
		data.extend_from_slice(&0u16.to_le_bytes());

		let animations = read_animations(&data, 1).unwrap();
		assert_eq!(2, animations.len());
		assert_eq!(2, animations[0].frame_count);
		assert_eq!(0, animations[1].frame_count);
	}
}
