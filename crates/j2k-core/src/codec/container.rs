//! JPEG 2000 container flavors and JP2 box wrapping.
//!
//! The encoder always writes a raw codestream. A wrapped (JP2) file is that
//! codestream placed in a `jp2c` box behind the signature, file type and
//! header boxes, so both flavors come out of the same single-write stream.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::planar::{ColorSpace, PlanarImage};

/// JPEG 2000 file flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    /// Codestream wrapped in JP2 boxes
    #[default]
    Jp2,
    /// Bare codestream
    Codestream,
}

impl Container {
    /// Guess the flavor from a file extension.
    ///
    /// `.j2k`, `.j2c` and `.jpc` (any case) are bare codestreams; everything
    /// else, including no extension, is JP2.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("j2k") | Some("j2c") | Some("jpc") => Container::Codestream,
            _ => Container::Jp2,
        }
    }

    /// The other flavor, tried when decoding with the first one fails.
    pub fn opposite(self) -> Self {
        match self {
            Container::Jp2 => Container::Codestream,
            Container::Codestream => Container::Jp2,
        }
    }
}

/// The 12-byte JP2 signature box.
pub const JP2_SIGNATURE: [u8; 12] = [
    0x00, 0x00, 0x00, 0x0C, b'j', b'P', b' ', b' ', 0x0D, 0x0A, 0x87, 0x0A,
];

/// Codestream start-of-codestream marker.
pub const SOC_MARKER: [u8; 2] = [0xFF, 0x4F];

const BOX_HEADER_LEN: usize = 8;

/// Enumerated colour spaces of the `colr` box.
const ENUM_CS_SRGB: u32 = 16;
const ENUM_CS_GRAY: u32 = 17;

/// `cdef` channel types.
const CHANNEL_COLOUR: u16 = 0;
const CHANNEL_OPACITY: u16 = 1;

/// Wrap a raw codestream in JP2 boxes describing `image`.
///
/// # Arguments
///
/// * `codestream` - Encoder output, starting with the SOC marker
/// * `image` - The planar image the codestream was encoded from
///
/// # Returns
///
/// The complete JP2 file: signature, `ftyp`, `jp2h` and `jp2c` boxes.
pub fn wrap_jp2(codestream: &[u8], image: &PlanarImage) -> Vec<u8> {
    let header = header_box(image);
    let capacity =
        JP2_SIGNATURE.len() + 20 + header.len() + BOX_HEADER_LEN + codestream.len();
    let mut out = Vec::with_capacity(capacity);

    out.extend_from_slice(&JP2_SIGNATURE);

    let mut ftyp = Vec::with_capacity(12);
    ftyp.extend_from_slice(b"jp2 ");
    ftyp.extend_from_slice(&0u32.to_be_bytes());
    ftyp.extend_from_slice(b"jp2 ");
    write_box(&mut out, b"ftyp", &ftyp);

    out.extend_from_slice(&header);
    write_box(&mut out, b"jp2c", codestream);
    out
}

/// Check whether `bytes` begin with the JP2 signature box.
pub fn is_jp2(bytes: &[u8]) -> bool {
    bytes.starts_with(&JP2_SIGNATURE)
}

/// Check whether `bytes` begin with a bare codestream.
pub fn is_codestream(bytes: &[u8]) -> bool {
    bytes.starts_with(&SOC_MARKER)
}

fn header_box(image: &PlanarImage) -> Vec<u8> {
    let count = image.component_count();
    let precisions: Vec<u8> = image
        .components
        .iter()
        .map(|c| (c.precision.saturating_sub(1) as u8 & 0x7F) | (u8::from(c.signed) << 7))
        .collect();
    let uniform = precisions.windows(2).all(|w| w[0] == w[1]);
    let bpc = match precisions.first() {
        Some(&first) if uniform => first,
        _ => 0xFF,
    };

    let mut ihdr = Vec::with_capacity(14);
    ihdr.extend_from_slice(&image.y1.saturating_sub(image.y0).to_be_bytes());
    ihdr.extend_from_slice(&image.x1.saturating_sub(image.x0).to_be_bytes());
    ihdr.extend_from_slice(&(count as u16).to_be_bytes());
    ihdr.push(bpc);
    ihdr.push(7); // compression type: JPEG 2000
    ihdr.push(0); // colour space known
    ihdr.push(0); // no intellectual property box

    let enum_cs = if image.color_space == ColorSpace::Gray || count < 3 {
        ENUM_CS_GRAY
    } else {
        ENUM_CS_SRGB
    };
    let mut colr = Vec::with_capacity(7);
    colr.push(1); // enumerated colour space
    colr.push(0);
    colr.push(0);
    colr.extend_from_slice(&enum_cs.to_be_bytes());

    let mut body = Vec::new();
    write_box(&mut body, b"ihdr", &ihdr);
    if bpc == 0xFF {
        write_box(&mut body, b"bpcc", &precisions);
    }
    write_box(&mut body, b"colr", &colr);
    if image.has_alpha() {
        write_box(&mut body, b"cdef", &channel_definitions(count));
    }

    let mut out = Vec::with_capacity(BOX_HEADER_LEN + body.len());
    write_box(&mut out, b"jp2h", &body);
    out
}

/// `cdef` payload: colour channels map to their own colour, the last
/// channel is opacity for the whole image.
fn channel_definitions(count: usize) -> Vec<u8> {
    let mut cdef = Vec::with_capacity(2 + count * 6);
    cdef.extend_from_slice(&(count as u16).to_be_bytes());
    for i in 0..count {
        let (kind, assoc) = if i + 1 == count {
            (CHANNEL_OPACITY, 0u16)
        } else {
            (CHANNEL_COLOUR, i as u16 + 1)
        };
        cdef.extend_from_slice(&(i as u16).to_be_bytes());
        cdef.extend_from_slice(&kind.to_be_bytes());
        cdef.extend_from_slice(&assoc.to_be_bytes());
    }
    cdef
}

fn write_box(out: &mut Vec<u8>, kind: &[u8; 4], payload: &[u8]) {
    let len = (BOX_HEADER_LEN + payload.len()) as u32;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(payload);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planar::Component;

    fn image(count: usize, width: u32, height: u32) -> PlanarImage {
        PlanarImage {
            x0: 0,
            y0: 0,
            x1: width,
            y1: height,
            color_space: if count < 3 { ColorSpace::Gray } else { ColorSpace::Srgb },
            components: (0..count).map(|_| Component::new_u8(width, height, 1, 1)).collect(),
        }
    }

    /// Split a box sequence into (type, payload) pairs.
    fn boxes(mut bytes: &[u8]) -> Vec<([u8; 4], Vec<u8>)> {
        let mut out = Vec::new();
        while bytes.len() >= 8 {
            let len = u32::from_be_bytes(bytes[..4].try_into().unwrap()) as usize;
            let kind: [u8; 4] = bytes[4..8].try_into().unwrap();
            out.push((kind, bytes[8..len].to_vec()));
            bytes = &bytes[len..];
        }
        out
    }

    #[test]
    fn test_from_path() {
        assert_eq!(Container::from_path(Path::new("a.j2k")), Container::Codestream);
        assert_eq!(Container::from_path(Path::new("a.J2C")), Container::Codestream);
        assert_eq!(Container::from_path(Path::new("a.jpc")), Container::Codestream);
        assert_eq!(Container::from_path(Path::new("a.jp2")), Container::Jp2);
        assert_eq!(Container::from_path(Path::new("a.png")), Container::Jp2);
        assert_eq!(Container::from_path(Path::new("noext")), Container::Jp2);
    }

    #[test]
    fn test_opposite() {
        assert_eq!(Container::Jp2.opposite(), Container::Codestream);
        assert_eq!(Container::Codestream.opposite(), Container::Jp2);
    }

    #[test]
    fn test_wrap_box_sequence() {
        let codestream = [0xFF, 0x4F, 0xFF, 0x51, 1, 2, 3];
        let wrapped = wrap_jp2(&codestream, &image(3, 4, 2));

        assert!(is_jp2(&wrapped));
        let top = boxes(&wrapped);
        let kinds: Vec<&[u8; 4]> = top.iter().map(|(k, _)| k).collect();
        assert_eq!(kinds, vec![b"jP  ", b"ftyp", b"jp2h", b"jp2c"]);
        assert_eq!(top[3].1, codestream.to_vec());
        assert!(is_codestream(&top[3].1));
    }

    #[test]
    fn test_ihdr_fields() {
        let wrapped = wrap_jp2(&SOC_MARKER, &image(3, 640, 480));
        let jp2h = &boxes(&wrapped)[2].1;
        let inner = boxes(jp2h);

        assert_eq!(&inner[0].0, b"ihdr");
        let ihdr = &inner[0].1;
        assert_eq!(u32::from_be_bytes(ihdr[0..4].try_into().unwrap()), 480);
        assert_eq!(u32::from_be_bytes(ihdr[4..8].try_into().unwrap()), 640);
        assert_eq!(u16::from_be_bytes(ihdr[8..10].try_into().unwrap()), 3);
        assert_eq!(ihdr[10], 7);
        assert_eq!(ihdr[11], 7);

        assert_eq!(&inner[1].0, b"colr");
        assert_eq!(u32::from_be_bytes(inner[1].1[3..7].try_into().unwrap()), ENUM_CS_SRGB);
        assert_eq!(inner.len(), 2);
    }

    #[test]
    fn test_gray_alpha_header() {
        let wrapped = wrap_jp2(&SOC_MARKER, &image(2, 1, 1));
        let inner = boxes(&boxes(&wrapped)[2].1);

        assert_eq!(u32::from_be_bytes(inner[1].1[3..7].try_into().unwrap()), ENUM_CS_GRAY);
        assert_eq!(&inner[2].0, b"cdef");
        // Two channels: luma (colour 1), alpha (opacity, whole image)
        assert_eq!(inner[2].1, vec![0, 2, 0, 0, 0, 0, 0, 1, 0, 1, 0, 1, 0, 0]);
    }

    #[test]
    fn test_mixed_precision_writes_bpcc() {
        let mut img = image(3, 1, 1);
        img.components[2].precision = 12;
        let inner = boxes(&boxes(&wrap_jp2(&SOC_MARKER, &img))[2].1);

        assert_eq!(inner[0].1[10], 0xFF);
        assert_eq!(&inner[1].0, b"bpcc");
        assert_eq!(inner[1].1, vec![7, 7, 11]);
    }

    #[test]
    fn test_container_serde() {
        assert_eq!(serde_json::to_string(&Container::Codestream).unwrap(), "\"codestream\"");
        let c: Container = serde_json::from_str("\"jp2\"").unwrap();
        assert_eq!(c, Container::Jp2);
    }
}
