//! TrackVis `.trk` fiber track decoding
//!
//! A 1000-byte little-endian header is followed by one variable-length record
//! per track:
//!
//! ```text
//! [4] point count P
//! P x ( [12] x, y, z as f32 | [n_scalars * 4] per-point scalars )
//! [n_properties * 4] per-track properties
//! ```
//!
//! Coordinates are stored in voxel units and converted to millimetres by
//! dividing by the header's voxel size. Tracks are then turned into a
//! line-list buffer where each segment owns both of its endpoints.

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::cursor::ByteCursor;
use crate::geometry::{distance, normalize, Bounds, Placement, Vec3};
use crate::Result;

/// Size of the TrackVis header and offset of the first record
pub const TRACK_HEADER_SIZE: usize = 1000;

/// Width of one name slot in `scalar_name` / `property_name`
const NAME_SLOT: usize = 20;

/// Decoded TrackVis header
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackHeader {
    pub id_string: String,
    pub dim: [u16; 3],
    pub voxel_size: Vec3,
    pub origin: Vec3,
    pub n_scalars: u16,
    pub scalar_name: String,
    pub n_properties: u16,
    pub property_name: String,
    pub vox_to_ras: [f32; 16],
    pub reserved: String,
    pub voxel_order: String,
    pub pad2: String,
    pub image_orientation_patient: [f32; 6],
    pub pad1: String,
    pub invert_x: u8,
    pub invert_y: u8,
    pub invert_z: u8,
    pub swap_xy: u8,
    pub swap_yz: u8,
    pub swap_zx: u8,
    /// Number of tracks; 0 means the count was not recorded
    pub n_count: u32,
    pub version: u32,
    pub hdr_size: u32,
}

impl Default for TrackHeader {
    fn default() -> Self {
        Self {
            id_string: "TRACK\0".to_string(),
            dim: [0; 3],
            voxel_size: [1.0; 3],
            origin: [0.0; 3],
            n_scalars: 0,
            scalar_name: "\0".repeat(200),
            n_properties: 0,
            property_name: "\0".repeat(200),
            vox_to_ras: [0.0; 16],
            reserved: "\0".repeat(444),
            voxel_order: "LPS\0".to_string(),
            pad2: "\0".repeat(4),
            image_orientation_patient: [0.0; 6],
            pad1: "\0".repeat(2),
            invert_x: 0,
            invert_y: 0,
            invert_z: 0,
            swap_xy: 0,
            swap_yz: 0,
            swap_zx: 0,
            n_count: 0,
            version: 2,
            hdr_size: TRACK_HEADER_SIZE as u32,
        }
    }
}

impl TrackHeader {
    /// Read the 1000-byte header at the start of `data`
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut c = ByteCursor::new(data);
        c.ensure(TRACK_HEADER_SIZE)?;

        let id_string = c.read_fixed_string(6)?;
        let dim = c.read_u16_le_array(3)?;
        let voxel_size = c.read_f32_le_array(3)?;
        let origin = c.read_f32_le_array(3)?;
        let n_scalars = c.read_u16_le()?;
        let scalar_name = c.read_fixed_string(200)?;
        let n_properties = c.read_u16_le()?;
        let property_name = c.read_fixed_string(200)?;
        let vox_to_ras = c.read_f32_le_array(16)?;
        let reserved = c.read_fixed_string(444)?;
        let voxel_order = c.read_fixed_string(4)?;
        let pad2 = c.read_fixed_string(4)?;
        let orientation = c.read_f32_le_array(6)?;
        let pad1 = c.read_fixed_string(2)?;

        let header = Self {
            id_string,
            dim: [dim[0], dim[1], dim[2]],
            voxel_size: [voxel_size[0], voxel_size[1], voxel_size[2]],
            origin: [origin[0], origin[1], origin[2]],
            n_scalars,
            scalar_name,
            n_properties,
            property_name,
            vox_to_ras: to_array(&vox_to_ras),
            reserved,
            voxel_order,
            pad2,
            image_orientation_patient: to_array(&orientation),
            pad1,
            invert_x: c.read_u8()?,
            invert_y: c.read_u8()?,
            invert_z: c.read_u8()?,
            swap_xy: c.read_u8()?,
            swap_yz: c.read_u8()?,
            swap_zx: c.read_u8()?,
            n_count: c.read_u32_le()?,
            version: c.read_u32_le()?,
            hdr_size: c.read_u32_le()?,
        };
        debug_assert_eq!(c.position(), TRACK_HEADER_SIZE);

        if !header.id_string.starts_with("TRACK") {
            warn!("Unexpected track id string {:?}", header.id_string);
        }
        if header.hdr_size as usize != TRACK_HEADER_SIZE {
            warn!(
                "Track header declares size {}, reading records at {}",
                header.hdr_size, TRACK_HEADER_SIZE
            );
        }

        Ok(header)
    }

    /// Names of the per-point scalars, stored in 20-byte slots
    pub fn scalar_names(&self) -> Vec<String> {
        split_names(&self.scalar_name, self.n_scalars as usize)
    }

    /// Names of the per-track properties, stored in 20-byte slots
    pub fn property_names(&self) -> Vec<String> {
        split_names(&self.property_name, self.n_properties as usize)
    }
}

fn to_array<const N: usize>(values: &[f32]) -> [f32; N] {
    let mut out = [0.0; N];
    out.copy_from_slice(&values[..N]);
    out
}

fn split_names(field: &str, count: usize) -> Vec<String> {
    let chars: Vec<char> = field.chars().collect();
    chars
        .chunks(NAME_SLOT)
        .take(count)
        .map(|slot| slot.iter().take_while(|&&c| c != '\0').collect())
        .collect()
}

/// One fiber track in millimetre space
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    pub points: Vec<Vec3>,
    /// Per-point scalars, `n_scalars` consecutive values per point
    pub scalars: Vec<f32>,
    /// Per-track properties, empty when the header declares none
    pub properties: Vec<f32>,
    /// Sum of distances between consecutive points
    pub length: f32,
}

impl Track {
    pub fn new(points: Vec<Vec3>, scalars: Vec<f32>, properties: Vec<f32>) -> Self {
        let length = points.windows(2).map(|w| distance(w[1], w[0])).sum();
        Self {
            points,
            scalars,
            properties,
            length,
        }
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn segment_count(&self) -> usize {
        self.points.len().saturating_sub(1)
    }

    /// Scalars attached to point `index`; empty when the file has none
    pub fn point_scalars(&self, index: usize) -> &[f32] {
        if self.points.is_empty() || self.scalars.is_empty() {
            return &[];
        }
        let per_point = self.scalars.len() / self.points.len();
        &self.scalars[index * per_point..(index + 1) * per_point]
    }

    /// Unit vector from the first to the last point, built from absolute
    /// component differences so it can double as an RGB color.
    pub fn direction(&self) -> Vec3 {
        match (self.points.first(), self.points.last()) {
            (Some(start), Some(end)) => normalize([
                (end[0] - start[0]).abs(),
                (end[1] - start[1]).abs(),
                (end[2] - start[2]).abs(),
            ]),
            _ => [0.0; 3],
        }
    }
}

/// A decoded track file with its line-list render buffers
#[derive(Debug, Clone, Serialize)]
pub struct TrackSet {
    pub header: TrackHeader,
    pub tracks: Vec<Track>,
    /// Segment endpoints as `[x, y, z, track length]`
    pub position_buffer: Vec<f32>,
    /// Per-vertex track direction color
    pub color_buffer: Vec<f32>,
    /// Bounds over every point except each track's last one
    pub bounds: Option<Bounds>,
    pub placement: Placement,
}

impl TrackSet {
    /// Decode a fully buffered `.trk` file
    pub fn decode(data: &[u8]) -> Result<Self> {
        let header = TrackHeader::decode(data)?;
        debug!(
            "Track header: {} tracks, {} scalars, {} properties, voxel size {:?}",
            header.n_count, header.n_scalars, header.n_properties, header.voxel_size
        );

        let mut cursor = ByteCursor::at(data, TRACK_HEADER_SIZE);
        // Every record holds at least its 4-byte point count
        let mut tracks = Vec::with_capacity((header.n_count as usize).min(cursor.remaining() / 4));

        if header.n_count > 0 {
            for _ in 0..header.n_count {
                tracks.push(read_track(&mut cursor, &header)?);
            }
        } else {
            while cursor.remaining() > 0 {
                tracks.push(read_track(&mut cursor, &header)?);
            }
            debug!("Read {} tracks from a file without a count", tracks.len());
        }

        Ok(Self::from_tracks(header, tracks))
    }

    /// Build render buffers and placement for already decoded tracks
    pub fn from_tracks(header: TrackHeader, tracks: Vec<Track>) -> Self {
        let vertex_count: usize = tracks.iter().map(|t| t.segment_count() * 2).sum();
        let mut position_buffer = Vec::with_capacity(vertex_count * 4);
        let mut color_buffer = Vec::with_capacity(vertex_count * 3);
        let mut bounds: Option<Bounds> = None;

        for track in &tracks {
            let color = track.direction();

            for pair in track.points.windows(2) {
                match bounds.as_mut() {
                    Some(b) => b.include(pair[0]),
                    None => bounds = Some(Bounds::new(pair[0], pair[0])),
                }

                for point in pair {
                    position_buffer.extend_from_slice(&[point[0], point[1], point[2], track.length]);
                    color_buffer.extend_from_slice(&color);
                }
            }
        }
        trace!("Built {} line vertices", vertex_count);

        let placement = Placement::from_bounds(bounds.as_ref());
        Self {
            header,
            tracks,
            position_buffer,
            color_buffer,
            bounds,
            placement,
        }
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Two vertices per line segment
    pub fn rendered_vertex_count(&self) -> usize {
        self.position_buffer.len() / 4
    }

    /// Tracks at least `min_length` millimetres long
    pub fn tracks_longer_than(&self, min_length: f32) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(move |t| t.length >= min_length)
    }
}

fn read_track(cursor: &mut ByteCursor<'_>, header: &TrackHeader) -> Result<Track> {
    let point_count = cursor.read_u32_le()? as usize;
    let n_scalars = header.n_scalars as usize;
    let n_properties = header.n_properties as usize;

    let point_stride = (3 + n_scalars) * 4;
    cursor.ensure(point_count.saturating_mul(point_stride))?;

    let mut points = Vec::with_capacity(point_count);
    let mut scalars = Vec::with_capacity(point_count * n_scalars);
    for _ in 0..point_count {
        let x = cursor.read_f32_le()?;
        let y = cursor.read_f32_le()?;
        let z = cursor.read_f32_le()?;
        if n_scalars > 0 {
            scalars.extend(cursor.read_f32_le_array(n_scalars)?);
        }
        points.push([
            x / header.voxel_size[0],
            y / header.voxel_size[1],
            z / header.voxel_size[2],
        ]);
    }

    let properties = if n_properties > 0 {
        cursor.read_f32_le_array(n_properties)?
    } else {
        Vec::new()
    };

    Ok(Track::new(points, scalars, properties))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::encode_tracks;
    use crate::error::FormatError;

    fn header(n_scalars: u16, n_properties: u16) -> TrackHeader {
        TrackHeader {
            voxel_size: [2.0, 2.0, 2.0],
            n_scalars,
            n_properties,
            ..TrackHeader::default()
        }
    }

    #[test]
    fn test_header_fields_round_trip_through_layout() {
        let mut original = header(1, 2);
        original.dim = [128, 128, 60];
        original.origin = [1.0, 2.0, 3.0];
        original.vox_to_ras[0] = -1.0;
        original.vox_to_ras[15] = 1.0;
        original.image_orientation_patient = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        original.invert_y = 1;
        original.swap_zx = 1;

        let bytes = encode_tracks(&original, &[]);
        assert_eq!(bytes.len(), TRACK_HEADER_SIZE);

        let decoded = TrackHeader::decode(&bytes).unwrap();
        assert_eq!(decoded.dim, [128, 128, 60]);
        assert_eq!(decoded.origin, [1.0, 2.0, 3.0]);
        assert_eq!(decoded.vox_to_ras[0], -1.0);
        assert_eq!(decoded.invert_y, 1);
        assert_eq!(decoded.swap_zx, 1);
        assert_eq!(decoded.hdr_size, 1000);
        assert_eq!(decoded.n_count, 0);
        assert_eq!(&decoded.id_string, "TRACK\0");
    }

    #[test]
    fn test_points_are_converted_to_millimetres() {
        let tracks = vec![Track::new(
            vec![[0.0, 0.0, 0.0], [3.0, 4.0, 0.0], [3.0, 4.0, 12.0]],
            vec![],
            vec![],
        )];
        let bytes = encode_tracks(&header(0, 0), &tracks);

        let set = TrackSet::decode(&bytes).unwrap();
        assert_eq!(set.track_count(), 1);
        assert_eq!(set.tracks[0].points, tracks[0].points);
        assert!((set.tracks[0].length - 17.0).abs() < 1e-5);
    }

    #[test]
    fn test_scalars_and_properties() {
        let mut h = header(2, 1);
        h.scalar_name.replace_range(0..2, "fa");
        h.scalar_name.replace_range(20..22, "md");

        let tracks = vec![
            Track::new(
                vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
                vec![0.1, 0.2, 0.3, 0.4],
                vec![7.0],
            ),
            Track::new(vec![[5.0, 5.0, 5.0]], vec![0.5, 0.6], vec![8.0]),
        ];
        let bytes = encode_tracks(&h, &tracks);

        let set = TrackSet::decode(&bytes).unwrap();
        assert_eq!(set.header.scalar_names(), vec!["fa", "md"]);
        assert_eq!(set.tracks[0].point_scalars(1), &[0.3, 0.4]);
        assert_eq!(set.tracks[0].properties, vec![7.0]);
        assert_eq!(set.tracks[1].point_scalars(0), &[0.5, 0.6]);
        assert_eq!(set.tracks[1].properties, vec![8.0]);
    }

    #[test]
    fn test_single_point_track_has_no_segments() {
        let tracks = vec![Track::new(vec![[1.0, 2.0, 3.0]], vec![], vec![])];
        let bytes = encode_tracks(&header(0, 0), &tracks);

        let set = TrackSet::decode(&bytes).unwrap();
        assert_eq!(set.tracks[0].length, 0.0);
        assert_eq!(set.rendered_vertex_count(), 0);
        assert!(set.bounds.is_none());
    }

    #[test]
    fn test_line_buffers() {
        let tracks = vec![
            Track::new(
                vec![[0.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 4.0, 0.0]],
                vec![],
                vec![],
            ),
            Track::new(vec![[4.0, 0.0, 0.0], [1.0, 0.0, 0.0]], vec![], vec![]),
        ];
        let set = TrackSet::from_tracks(header(0, 0), tracks);

        // 2 + 1 segments, two vertices each
        assert_eq!(set.rendered_vertex_count(), 6);
        assert_eq!(set.position_buffer.len(), 24);
        assert_eq!(set.color_buffer.len(), 18);

        assert_eq!(&set.position_buffer[0..4], &[0.0, 0.0, 0.0, 4.0]);
        assert_eq!(&set.position_buffer[4..8], &[0.0, 2.0, 0.0, 4.0]);
        assert_eq!(&set.position_buffer[8..12], &[0.0, 2.0, 0.0, 4.0]);
        assert_eq!(&set.color_buffer[0..3], &[0.0, 1.0, 0.0]);
        // Second track runs towards -x but its color stays positive
        assert_eq!(&set.color_buffer[12..15], &[1.0, 0.0, 0.0]);
        assert_eq!(&set.position_buffer[20..24], &[1.0, 0.0, 0.0, 3.0]);

        // Last points of each track are not part of the bounds
        let bounds = set.bounds.unwrap();
        assert_eq!(bounds.min, [0.0, 0.0, 0.0]);
        assert_eq!(bounds.max, [4.0, 2.0, 0.0]);
    }

    #[test]
    fn test_unknown_count_reads_to_end() {
        let tracks = vec![
            Track::new(vec![[0.0, 0.0, 0.0], [2.0, 0.0, 0.0]], vec![], vec![]),
            Track::new(vec![[0.0, 0.0, 0.0], [0.0, 2.0, 0.0]], vec![], vec![]),
            Track::new(vec![[0.0, 0.0, 0.0], [0.0, 0.0, 2.0]], vec![], vec![]),
        ];
        let mut bytes = encode_tracks(&header(0, 0), &tracks);
        // Clear n_count
        bytes[988..992].copy_from_slice(&[0, 0, 0, 0]);

        let set = TrackSet::decode(&bytes).unwrap();
        assert_eq!(set.track_count(), 3);
    }

    #[test]
    fn test_length_filter() {
        let tracks = vec![
            Track::new(vec![[0.0, 0.0, 0.0], [0.0, 0.0, 20.0]], vec![], vec![]),
            Track::new(vec![[0.0, 0.0, 0.0], [0.0, 0.0, 5.0]], vec![], vec![]),
        ];
        let set = TrackSet::from_tracks(header(0, 0), tracks);
        assert_eq!(set.tracks_longer_than(15.0).count(), 1);
    }

    #[test]
    fn test_truncated_record_fails() {
        let tracks = vec![Track::new(
            vec![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]],
            vec![],
            vec![],
        )];
        let bytes = encode_tracks(&header(0, 0), &tracks);

        let err = TrackSet::decode(&bytes[..bytes.len() - 4]).unwrap_err();
        assert!(matches!(err, FormatError::UnexpectedEof { .. }));

        let err = TrackHeader::decode(&bytes[..500]).unwrap_err();
        assert!(matches!(err, FormatError::UnexpectedEof { .. }));
    }

    #[test]
    fn test_huge_declared_count_fails_cleanly() {
        let mut bytes = encode_tracks(&TrackHeader::default(), &[]);
        bytes[988..992].copy_from_slice(&u32::MAX.to_le_bytes());

        let err = TrackSet::decode(&bytes).unwrap_err();
        assert!(matches!(err, FormatError::UnexpectedEof { offset: 1000, .. }));

        // One real record, far fewer than declared
        let tracks = vec![Track::new(vec![[1.0, 2.0, 3.0]], vec![], vec![])];
        let mut bytes = encode_tracks(&header(0, 0), &tracks);
        bytes[988..992].copy_from_slice(&1_000_000u32.to_le_bytes());
        assert!(matches!(
            TrackSet::decode(&bytes),
            Err(FormatError::UnexpectedEof { .. })
        ));
    }
}
