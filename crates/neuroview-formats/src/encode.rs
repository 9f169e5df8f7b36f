//! Writers for the binary dataset formats
//!
//! These produce files the decoders in this crate read back. They are used to
//! build fixtures and synthetic datasets; they do not try to reproduce every
//! quirk of files written by FreeSurfer or TrackVis.

use std::io::{self, Write};

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use tracing::trace;

use crate::curvature::CURVATURE_MAGIC;
use crate::surface::TRIANGLE_FILE_MAGIC;
use crate::tracks::{Track, TrackHeader, TRACK_HEADER_SIZE};

/// Write a FreeSurfer triangle surface
pub fn write_surface<W: Write>(
    writer: &mut W,
    info: &str,
    positions: &[f32],
    indices: &[u32],
) -> io::Result<()> {
    writer.write_u24::<BigEndian>(TRIANGLE_FILE_MAGIC)?;
    writer.write_all(info.as_bytes())?;
    writer.write_all(b"\n\n")?;

    writer.write_u32::<BigEndian>((positions.len() / 3) as u32)?;
    writer.write_u32::<BigEndian>((indices.len() / 3) as u32)?;
    for &value in positions {
        writer.write_f32::<BigEndian>(value)?;
    }
    for &index in indices {
        writer.write_u32::<BigEndian>(index)?;
    }

    trace!(
        "Wrote surface with {} vertices, {} faces",
        positions.len() / 3,
        indices.len() / 3
    );
    Ok(())
}

/// Write a FreeSurfer "new format" curvature file with one value per vertex
pub fn write_curvature<W: Write>(writer: &mut W, values: &[f32], face_count: u32) -> io::Result<()> {
    writer.write_u24::<BigEndian>(CURVATURE_MAGIC)?;
    writer.write_u32::<BigEndian>(values.len() as u32)?;
    writer.write_u32::<BigEndian>(face_count)?;
    writer.write_u32::<BigEndian>(1)?;
    for &value in values {
        writer.write_f32::<BigEndian>(value)?;
    }
    Ok(())
}

/// Write a TrackVis file. `n_count` is taken from `tracks`, and point
/// coordinates are converted back to voxel units.
pub fn write_tracks<W: Write>(
    writer: &mut W,
    header: &TrackHeader,
    tracks: &[Track],
) -> io::Result<()> {
    write_track_header(writer, header, tracks.len() as u32)?;

    let n_scalars = header.n_scalars as usize;
    let n_properties = header.n_properties as usize;

    for track in tracks {
        writer.write_u32::<LittleEndian>(track.points.len() as u32)?;
        for (i, point) in track.points.iter().enumerate() {
            for axis in 0..3 {
                writer.write_f32::<LittleEndian>(point[axis] * header.voxel_size[axis])?;
            }
            let scalars = track.point_scalars(i);
            for s in 0..n_scalars {
                writer.write_f32::<LittleEndian>(scalars.get(s).copied().unwrap_or(0.0))?;
            }
        }
        for p in 0..n_properties {
            writer.write_f32::<LittleEndian>(track.properties.get(p).copied().unwrap_or(0.0))?;
        }
    }

    trace!("Wrote {} tracks", tracks.len());
    Ok(())
}

fn write_track_header<W: Write>(writer: &mut W, header: &TrackHeader, n_count: u32) -> io::Result<()> {
    write_fixed(writer, &header.id_string, 6)?;
    for &d in &header.dim {
        writer.write_u16::<LittleEndian>(d)?;
    }
    write_f32_le_all(writer, &header.voxel_size)?;
    write_f32_le_all(writer, &header.origin)?;
    writer.write_u16::<LittleEndian>(header.n_scalars)?;
    write_fixed(writer, &header.scalar_name, 200)?;
    writer.write_u16::<LittleEndian>(header.n_properties)?;
    write_fixed(writer, &header.property_name, 200)?;
    write_f32_le_all(writer, &header.vox_to_ras)?;
    write_fixed(writer, &header.reserved, 444)?;
    write_fixed(writer, &header.voxel_order, 4)?;
    write_fixed(writer, &header.pad2, 4)?;
    write_f32_le_all(writer, &header.image_orientation_patient)?;
    write_fixed(writer, &header.pad1, 2)?;
    for flag in [
        header.invert_x,
        header.invert_y,
        header.invert_z,
        header.swap_xy,
        header.swap_yz,
        header.swap_zx,
    ] {
        writer.write_u8(flag)?;
    }
    writer.write_u32::<LittleEndian>(n_count)?;
    writer.write_u32::<LittleEndian>(header.version)?;
    writer.write_u32::<LittleEndian>(TRACK_HEADER_SIZE as u32)?;
    Ok(())
}

/// One byte per char, truncated or NUL-padded to `width`
fn write_fixed<W: Write>(writer: &mut W, text: &str, width: usize) -> io::Result<()> {
    let mut bytes: Vec<u8> = text.chars().take(width).map(|c| c as u32 as u8).collect();
    bytes.resize(width, 0);
    writer.write_all(&bytes)
}

fn write_f32_le_all<W: Write>(writer: &mut W, values: &[f32]) -> io::Result<()> {
    for &value in values {
        writer.write_f32::<LittleEndian>(value)?;
    }
    Ok(())
}

/// Surface file bytes. Writing into memory cannot fail.
pub fn encode_surface(info: &str, positions: &[f32], indices: &[u32]) -> Vec<u8> {
    let mut out = Vec::new();
    write_surface(&mut out, info, positions, indices)
        .map(|_| out)
        .unwrap_or_default()
}

pub fn encode_curvature(values: &[f32], face_count: u32) -> Vec<u8> {
    let mut out = Vec::new();
    write_curvature(&mut out, values, face_count)
        .map(|_| out)
        .unwrap_or_default()
}

pub fn encode_tracks(header: &TrackHeader, tracks: &[Track]) -> Vec<u8> {
    let mut out = Vec::new();
    write_tracks(&mut out, header, tracks)
        .map(|_| out)
        .unwrap_or_default()
}
