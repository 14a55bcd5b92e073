use crate::mmd::{
	Instruction,
	MmdAnimation,
	Pose
};

/// Animated transform channel. Raw stream values are fixed point; the axis
/// decides the conversion factor (4.12 scale, 4.12 revolutions to degrees,
/// or raw translation units).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Axis {
	ScaleX = 0,
	ScaleY = 1,
	ScaleZ = 2,
	RotX = 3,
	RotY = 4,
	RotZ = 5,
	PosX = 6,
	PosY = 7,
	PosZ = 8,
}

pub const AXES: [Axis; 9] = [
	Axis::ScaleX,
	Axis::ScaleY,
	Axis::ScaleZ,
	Axis::RotX,
	Axis::RotY,
	Axis::RotZ,
	Axis::PosX,
	Axis::PosY,
	Axis::PosZ,
];

impl Axis {
	pub fn from_index(index: u8) -> Axis {
		AXES[index as usize]
	}

	pub fn factor(self) -> f32 {
		match self {
			Axis::ScaleX | Axis::ScaleY | Axis::ScaleZ => 1.0 / 4096.0,
			Axis::RotX | Axis::RotY | Axis::RotZ => 360.0 / 4096.0,
			Axis::PosX | Axis::PosY | Axis::PosZ => 1.0,
		}
	}
}

/// Baked per-axis curves for one node, as time-ordered (seconds, value)
/// samples.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeCurves {
	axes: [Vec<(f32, f32)>; 9],
}

impl NodeCurves {
	fn from_pose(pose: &Pose) -> NodeCurves {
		let mut curves = NodeCurves::default();

		let raw = [
			pose.scale_x, pose.scale_y, pose.scale_z,
			pose.rot_x, pose.rot_y, pose.rot_z,
			pose.pos_x, pose.pos_y, pose.pos_z,
		];

		for axis in AXES {
			curves.axes[axis as usize].push((0.0, raw[axis as usize] as f32 * axis.factor()));
		}

		curves
	}

	pub fn samples(&self, axis: Axis) -> &[(f32, f32)] {
		&self.axes[axis as usize]
	}
}

/// `(time, vab bank, sound id)` cue; does not touch the curves.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SoundEvent {
	pub time: f32,
	pub vab_id: u8,
	pub sound_id: u8,
}

/// Timed texture atlas patch; also replayed against the CLUT composite map.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextureEvent {
	pub time: f32,
	pub src_x: u8,
	pub src_y: u8,
	pub dest_x: u8,
	pub dest_y: u8,
	pub width: u8,
	pub height: u8,
}

/// Sampled result of replaying one instruction stream.
///
/// The baked curves are always finite and bounded by the stream's frame
/// count. An endless loop region is never re-entered; its span is recorded
/// in `endless_start`/`endless_end` so a consumer can reconstruct the loop.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Animation {
	pub nodes: Vec<NodeCurves>,
	pub sounds: Vec<SoundEvent>,
	pub textures: Vec<TextureEvent>,
	pub endless_start: Option<f32>,
	pub endless_end: Option<f32>,
}

#[derive(Clone, Copy, Debug, Default)]
struct Momentum {
	key_frame: u32,
	value: f32,
}

/// What executing one instruction against the current frame state did.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Step {
	/// Took effect, move on to the next instruction within this frame.
	Consumed,
	/// Timecode not reached yet, stop dispatching until the next frame.
	Blocked,
	/// Endless loop boundary hit, the bake ends here.
	Finished,
}

/// Replay state for one bake. Two clocks drive it: `mtn_frame` follows the
/// stream and can jump backwards through loops, `key_frame` ticks
/// monotonically and is what emitted timecodes derive from.
struct Baker {
	nodes: Vec<NodeCurves>,
	momentum: Vec<[Momentum; 9]>,
	sounds: Vec<SoundEvent>,
	textures: Vec<TextureEvent>,
	endless_start: Option<f32>,
	endless_end: Option<f32>,

	mtn_frame: u32,
	key_frame: u32,
	time: f32,

	current_index: usize,
	jumpback_index: usize,
	loop_count: u8,
}

impl Baker {
	fn new(animation: &MmdAnimation) -> Baker {
		Baker {
			nodes: animation.poses.iter().map(NodeCurves::from_pose).collect(),
			momentum: vec![[Momentum::default(); 9]; animation.poses.len()],
			sounds: vec![],
			textures: vec![],
			endless_start: None,
			endless_end: None,
			mtn_frame: 0,
			key_frame: 0,
			time: 0.0,
			current_index: 0,
			jumpback_index: 0,
			loop_count: 0,
		}
	}

	/// Closes the running momentum segment of one axis: extrapolates the old
	/// rate over the frames it was active, appends the sample, re-arms the
	/// segment at the current frame. Exact duplicates of the previous sample
	/// are not appended.
	fn commit(&mut self, node: usize, axis: Axis) {
		let old = self.momentum[node][axis as usize];
		self.momentum[node][axis as usize].key_frame = self.key_frame;

		let curve = &mut self.nodes[node].axes[axis as usize];
		let last = curve[curve.len() - 1];
		let elapsed = (self.key_frame - old.key_frame) as f32;
		let sample = (self.time, last.1 + old.value * elapsed);

		if sample != last {
			curve.push(sample);
		}
	}

	fn commit_all(&mut self) {
		for node in 0..self.nodes.len() {
			for axis in AXES {
				self.commit(node, axis);
			}
		}
	}

	fn set_momentum(&mut self, node: usize, axis: Axis, value: f32) {
		self.momentum[node][axis as usize] = Momentum {
			key_frame: self.key_frame,
			value: value,
		};
	}

	fn step(&mut self, instruction: &Instruction) -> Step {
		match instruction {
			Instruction::Keyframe { timecode, entries } => {
				if self.mtn_frame != *timecode as u32 {
					return Step::Blocked;
				}

				// every axis commits here, keyframe samples stay aligned
				// across channels
				self.commit_all();

				for entry in entries {
					for (axis, value) in entry.values.iter() {
						self.set_momentum(entry.node as usize, *axis, value * axis.factor());
					}
				}

				Step::Consumed
			},
			Instruction::LoopStart { count } => {
				if *count == 0 || *count == 0xFF {
					self.endless_start = Some(self.time);
				}

				self.jumpback_index = self.current_index;
				self.loop_count = *count;

				Step::Consumed
			},
			Instruction::LoopEnd { timecode, new_time } => {
				if self.mtn_frame != *timecode as u32 {
					return Step::Blocked;
				}

				if self.loop_count == 0 || self.loop_count == 0xFF {
					self.endless_end = Some(self.time);
					return Step::Finished;
				}

				self.mtn_frame = *new_time as u32;
				self.loop_count -= 1;

				if self.loop_count != 0 {
					self.current_index = self.jumpback_index;
				}

				Step::Consumed
			},
			Instruction::ChangeTexture { timecode, src_x, src_y, dest_x, dest_y, width, height } => {
				if self.mtn_frame != *timecode as u32 {
					return Step::Blocked;
				}

				self.textures.push(TextureEvent {
					time: self.time,
					src_x: *src_x,
					src_y: *src_y,
					dest_x: *dest_x,
					dest_y: *dest_y,
					width: *width,
					height: *height,
				});

				Step::Consumed
			},
			Instruction::PlaySound { timecode, sound_id, vab_id } => {
				if self.mtn_frame != *timecode as u32 {
					return Step::Blocked;
				}

				self.sounds.push(SoundEvent {
					time: self.time,
					vab_id: *vab_id,
					sound_id: *sound_id,
				});

				Step::Consumed
			},
		}
	}

	fn run(mut self, animation: &MmdAnimation) -> Animation {
		'frames: loop {
			while let Some(instruction) = animation.instructions.get(self.current_index) {
				match self.step(instruction) {
					Step::Consumed => self.current_index += 1,
					Step::Blocked => break,
					Step::Finished => break 'frames,
				}
			}

			self.mtn_frame += 1;
			self.key_frame += 1;
			self.time = (self.key_frame.saturating_sub(1)) as f32 / 20.0;

			if self.mtn_frame >= animation.frame_count as u32 {
				break;
			}
		}

		// flush the last segment of every channel and kill its momentum
		self.commit_all();
		for row in self.momentum.iter_mut() {
			for momentum in row.iter_mut() {
				momentum.value = 0.0;
			}
		}

		Animation {
			nodes: self.nodes,
			sounds: self.sounds,
			textures: self.textures,
			endless_start: self.endless_start,
			endless_end: self.endless_end,
		}
	}
}

impl Animation {
	/// Replays an instruction stream into finite sampled curves. The base
	/// clock runs at 20 frames per second.
	pub fn bake(animation: &MmdAnimation) -> Animation {
		Baker::new(animation).run(animation)
	}
}
