use bitflags::bitflags;

use std::io;
use thiserror::Error;

use ultraviolet::vec::Vec3;

use dwt_core::cursor::ByteCursor;

pub const MAGIC: u32 = 0x41;

bitflags! {
	pub struct Flag: u8 {
		const LIGHT_DISABLED = 1;
		const DOUBLE_FACED = 2;
		const GRADATED = 4;
	}

	pub struct Mode: u8 {
		const BRIGHTNESS = 1;
		const TRANSLUCENT = 2;
		const TEXTURED = 4;
		const QUAD = 8;
		const GOURAUD = 16;
	}
}

/// Primitive kind, stored in the top 3 bits of the mode byte.
#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(u8)]
pub enum PrimitiveKind {
	Unknown = 0,
	Polygon = 1,
	Line = 2,
	Sprite = 3,
}

impl PrimitiveKind {
	fn from_mode(mode: u8) -> PrimitiveKind {
		match mode >> 5 {
			1 => PrimitiveKind::Polygon,
			2 => PrimitiveKind::Line,
			3 => PrimitiveKind::Sprite,
			_ => PrimitiveKind::Unknown,
		}
	}
}

#[derive(Debug, Error)]
pub enum TMDImportError {
	#[error("Unsupported primitive kind: {0:?}")]
	Code(PrimitiveKind),
	#[error("I/O error")]
	IO {
		#[from]
		source: io::Error,
	},
	#[error("Not a TMD container: {0}")]
	Magic(u32),
}

/// Raw 16-bit fixed point vertex, 12 fractional bits.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SVector {
	pub x: i16,
	pub y: i16,
	pub z: i16,
	/// padding in vertex records, bone id in some containers
	pub pad: i16,
}

impl SVector {
	#[cfg(feature = "import")]
	fn read(cursor: &mut ByteCursor) -> io::Result<SVector> {
		Ok(SVector {
			x: cursor.read_i16()?,
			y: cursor.read_i16()?,
			z: cursor.read_i16()?,
			pad: cursor.read_i16()?,
		})
	}

	pub fn to_vec3(&self, decimal_bits: u32) -> Vec3 {
		let scale = 1.0 / (1 << decimal_bits) as f32;
		Vec3::new(self.x as f32 * scale, self.y as f32 * scale, self.z as f32 * scale)
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct UvCoord {
	pub u: u8,
	pub v: u8,
}

/// CLUT framebuffer coordinates claimed by a textured primitive.
/// X is stored in 16-halfword units and scaled up on decode.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ClutInfo {
	pub x: u16,
	pub y: u16,
}

impl ClutInfo {
	fn from_raw(raw: u16) -> ClutInfo {
		ClutInfo {
			x: (raw & 0x3F) << 4,
			y: (raw >> 6) & 0x1FF,
		}
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TextureInfo {
	pub page: u8,
	pub mixture_rate: u8,
	pub color_mode: u8,
}

impl TextureInfo {
	fn from_raw(raw: u16) -> TextureInfo {
		TextureInfo {
			page: (raw & 0x1F) as u8,
			mixture_rate: ((raw >> 5) & 3) as u8,
			color_mode: ((raw >> 8) & 3) as u8,
		}
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Color {
	pub r: u8,
	pub g: u8,
	pub b: u8,
}

impl Color {
	#[cfg(feature = "import")]
	fn read(cursor: &mut ByteCursor) -> io::Result<Color> {
		let r = cursor.read_u8()?;
		let g = cursor.read_u8()?;
		let b = cursor.read_u8()?;
		cursor.skip(1);

		Ok(Color { r: r, g: g, b: b })
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MaterialKind {
	/// untextured, vertex colors only
	Color,
	/// textured with lighting disabled
	NoLight,
	/// textured and lit
	Texture,
}

/// How many of each attribute a primitive header implies. Pure function of
/// the two bit fields; the record layout is not self-describing beyond them.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AttributeCounts {
	pub vertices: u32,
	pub normals: u32,
	pub colors: u32,
}

pub fn attribute_counts(flag: Flag, mode: Mode) -> AttributeCounts {
	let vertices = if mode.contains(Mode::QUAD) { 4 } else { 3 };

	let normals = if flag.contains(Flag::LIGHT_DISABLED) || mode.contains(Mode::BRIGHTNESS) {
		0
	} else if mode.contains(Mode::GOURAUD) {
		vertices
	} else {
		1
	};

	let colors = if flag.contains(Flag::GRADATED) {
		vertices
	} else if flag.contains(Flag::LIGHT_DISABLED) {
		if mode.contains(Mode::GOURAUD) { vertices } else { 1 }
	} else if !mode.contains(Mode::TEXTURED) {
		1
	} else {
		0
	};

	AttributeCounts {
		vertices: vertices,
		normals: normals,
		colors: colors,
	}
}

/// A decoded triangle with all optional attributes resolved per corner.
/// Normal/color/UV data is sparse per primitive (0, 1 or 3 entries), so
/// faces carry values rather than indices into shared arrays.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Face {
	pub vertices: [u16; 3],
	pub normals: Option<[u16; 3]>,
	pub uvs: Option<[UvCoord; 3]>,
	pub colors: Option<[Color; 3]>,

	pub gradated: bool,
	pub light_disabled: bool,
	pub double_faced: bool,
	pub gouraud: bool,
	pub textured: bool,
	pub translucent: bool,
	pub brightness_disabled: bool,

	pub texture: TextureInfo,
	pub clut: ClutInfo,
	pub material: MaterialKind,
}

/// One packed primitive record, decoded but not yet triangulated.
#[derive(Clone, Debug, PartialEq)]
pub struct Primitive {
	pub flag: Flag,
	pub mode: Mode,
	pub clut: ClutInfo,
	pub texture: TextureInfo,
	pub uvs: Vec<UvCoord>,
	pub colors: Vec<Color>,
	pub normals: Vec<u16>,
	pub vertices: Vec<u16>,
}

impl Primitive {
	/// Decodes one record and leaves the cursor on the next 4-byte boundary.
	///
	/// Field order is load-bearing: the stream is not self-describing, so a
	/// misordered read shifts every later value instead of failing.
	#[cfg(feature = "import")]
	pub fn read(cursor: &mut ByteCursor) -> Result<Primitive, TMDImportError> {
		cursor.skip(2); // olen/ilen
		let flag = Flag::from_bits_truncate(cursor.read_u8()?);
		let mode_raw = cursor.read_u8()?;
		let mode = Mode::from_bits_truncate(mode_raw);

		let kind = PrimitiveKind::from_mode(mode_raw);
		if kind != PrimitiveKind::Polygon {
			return Err(TMDImportError::Code(kind));
		}

		let counts = attribute_counts(flag, mode);

		let mut clut = ClutInfo::default();
		let mut texture = TextureInfo::default();
		let mut uvs = vec![];

		if mode.contains(Mode::TEXTURED) {
			uvs.push(UvCoord { u: cursor.read_u8()?, v: cursor.read_u8()? });
			clut = ClutInfo::from_raw(cursor.read_u16()?);
			uvs.push(UvCoord { u: cursor.read_u8()?, v: cursor.read_u8()? });
			texture = TextureInfo::from_raw(cursor.read_u16()?);
			uvs.push(UvCoord { u: cursor.read_u8()?, v: cursor.read_u8()? });
			cursor.skip(2);

			if counts.vertices == 4 {
				uvs.push(UvCoord { u: cursor.read_u8()?, v: cursor.read_u8()? });
				cursor.skip(2);
			}
		}

		let mut colors = vec![];
		for _ in 0..counts.colors {
			colors.push(Color::read(cursor)?);
		}

		let mut normals = vec![];
		let mut vertices = vec![];
		for i in 0..counts.vertices {
			if i < counts.normals {
				normals.push(cursor.read_u16()?);
			}
			vertices.push(cursor.read_u16()?);
		}

		cursor.align(4);

		Ok(Primitive {
			flag: flag,
			mode: mode,
			clut: clut,
			texture: texture,
			uvs: uvs,
			colors: colors,
			normals: normals,
			vertices: vertices,
		})
	}

	fn face(&self, idx1: usize, idx2: usize, idx3: usize) -> Face {
		let textured = self.mode.contains(Mode::TEXTURED);
		let light_disabled = self.flag.contains(Flag::LIGHT_DISABLED);
		let brightness_disabled = self.mode.contains(Mode::BRIGHTNESS);

		let material = if !textured {
			MaterialKind::Color
		} else if brightness_disabled || light_disabled {
			MaterialKind::NoLight
		} else {
			MaterialKind::Texture
		};

		// single-entry attribute arrays apply to every corner
		let pick = |v: &Vec<u16>, i: usize| v[if v.len() == 1 { 0 } else { i }];
		let pick_color = |i: usize| self.colors[if self.colors.len() == 1 { 0 } else { i }];

		Face {
			vertices: [self.vertices[idx1], self.vertices[idx2], self.vertices[idx3]],
			normals: if self.normals.is_empty() {
				None
			} else {
				Some([pick(&self.normals, idx1), pick(&self.normals, idx2), pick(&self.normals, idx3)])
			},
			uvs: if self.uvs.is_empty() {
				None
			} else {
				Some([self.uvs[idx1], self.uvs[idx2], self.uvs[idx3]])
			},
			colors: if self.colors.is_empty() {
				None
			} else {
				Some([pick_color(idx1), pick_color(idx2), pick_color(idx3)])
			},
			gradated: self.flag.contains(Flag::GRADATED),
			light_disabled: light_disabled,
			double_faced: self.flag.contains(Flag::DOUBLE_FACED),
			gouraud: self.mode.contains(Mode::GOURAUD),
			textured: textured,
			translucent: self.mode.contains(Mode::TRANSLUCENT),
			brightness_disabled: brightness_disabled,
			texture: self.texture,
			clut: self.clut,
			material: material,
		}
	}

	/// Triangulates into faces. The base triangle is wound (2,1,0); the
	/// mirror and quad tie-break order matches the console's culling
	/// expectations and must not be reordered.
	pub fn to_faces(&self) -> Vec<Face> {
		let mut faces = vec![];
		let double = self.flag.contains(Flag::DOUBLE_FACED);

		faces.push(self.face(2, 1, 0));
		if double {
			faces.push(self.face(0, 1, 2));
		}

		if self.mode.contains(Mode::QUAD) {
			faces.push(self.face(1, 2, 3));
			if double {
				faces.push(self.face(3, 2, 1));
			}
		}

		faces
	}
}

/// One TMD object: raw vertices, converted normals, triangulated faces.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
	pub vertices: Vec<SVector>,
	pub normals: Vec<Vec3>,
	pub faces: Vec<Face>,
}

/// Reads every object of a TMD container. Offsets in the object table are
/// relative to the table itself (12 bytes in).
#[cfg(feature = "import")]
pub fn read_tmd(buffer: &[u8]) -> Result<Vec<Mesh>, TMDImportError> {
	const TABLE_BASE: u64 = 12;

	let mut cursor = ByteCursor::new(buffer);

	let id = cursor.read_u32()?;
	if id != MAGIC {
		return Err(TMDImportError::Magic(id));
	}

	let _flags = cursor.read_u32()?;
	let num_obj = cursor.read_u32()?;

	let mut meshes = vec![];

	for i in 0..num_obj {
		cursor.set_position(TABLE_BASE + i as u64 * 28);
		let vert_top = cursor.read_u32()?;
		let n_vert = cursor.read_u32()?;
		let normal_top = cursor.read_u32()?;
		let n_normal = cursor.read_u32()?;
		let primitive_top = cursor.read_u32()?;
		let n_primitive = cursor.read_u32()?;
		let _scale = cursor.read_i32()?;

		let mut mesh = Mesh::default();

		cursor.set_position(TABLE_BASE + vert_top as u64);
		for _ in 0..n_vert {
			mesh.vertices.push(SVector::read(&mut cursor)?);
		}

		cursor.set_position(TABLE_BASE + normal_top as u64);
		for _ in 0..n_normal {
			mesh.normals.push(SVector::read(&mut cursor)?.to_vec3(12));
		}

		cursor.set_position(TABLE_BASE + primitive_top as u64);
		for _ in 0..n_primitive {
			let primitive = Primitive::read(&mut cursor)?;
			mesh.faces.extend(primitive.to_faces());
		}

		meshes.push(mesh);
	}

	Ok(meshes)
}
