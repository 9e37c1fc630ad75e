use anyhow::bail;

use crate::header::{Header, DIMS};
use crate::status::MalformedError;

/// An inclusive axis-aligned box in element coordinates, both `lb` and `ub`
/// inclusive on every axis (spec.md §3 "ROI", §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roi {
    pub lb: [u32; DIMS],
    pub ub: [u32; DIMS],
}

impl Roi {
    /// The whole image, per `header.xyzct`.
    pub fn full(header: &Header) -> Roi {
        let mut ub = [0; DIMS];
        for i in 0..DIMS {
            ub[i] = header.xyzct[i] - 1;
        }
        Roi { lb: [0; DIMS], ub }
    }

    /// A single-element-thick slice at `index` along `axis`, full extent on
    /// every other axis (spec.md §3 "Helper constructors produce ...
    /// single-plane ROIs along one axis").
    pub fn plane(header: &Header, axis: usize, index: u32) -> Roi {
        assert!(axis < DIMS, "axis {axis} out of range for a {DIMS}-axis ROI");
        let mut lb = [0; DIMS];
        let mut ub = [0; DIMS];
        for i in 0..DIMS {
            ub[i] = header.xyzct[i] - 1;
        }
        lb[axis] = index;
        ub[axis] = index;
        Roi { lb, ub }
    }

    /// Per-axis extent, `ub[i] - lb[i] + 1` (both bounds inclusive).
    pub fn extent(&self) -> [u32; DIMS] {
        let mut e = [0u32; DIMS];
        for i in 0..DIMS {
            e[i] = self.ub[i] - self.lb[i] + 1;
        }
        e
    }

    /// Total element count covered by the region.
    pub fn size_elements(&self) -> u64 {
        self.extent().iter().map(|&e| e as u64).product()
    }

    /// Check `0 <= lb[i] <= ub[i] < xyzct[i]` on every axis (spec.md §3
    /// "ROI"); a reversed or out-of-bounds ROI is malformed input, not a
    /// panic.
    pub fn validate(&self, header: &Header) -> anyhow::Result<()> {
        for i in 0..DIMS {
            if self.lb[i] > self.ub[i] {
                bail!(MalformedError(format!(
                    "roi axis {i}: lb {} > ub {}",
                    self.lb[i], self.ub[i]
                )));
            }
            if self.ub[i] >= header.xyzct[i] {
                bail!(MalformedError(format!(
                    "roi axis {i}: ub {} is out of bounds for image extent {}",
                    self.ub[i], header.xyzct[i]
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{CompressionType, DataType, METADATA_SIZE};

    fn header(xyzct: [u32; DIMS]) -> Header {
        Header {
            header_version: crate::header::HEADER_VERSION,
            xyzct,
            pixel_size: [1.0; DIMS],
            data_type: DataType::Uint8,
            compression_type: CompressionType::None,
            metadata: [0u8; METADATA_SIZE],
            block_size: [4, 4, 4, 1, 1],
            block_offsets: vec![],
        }
    }

    #[test]
    fn full_covers_whole_image() {
        let h = header([10, 20, 30, 1, 1]);
        let roi = Roi::full(&h);
        assert_eq!(roi.extent(), h.xyzct);
        assert_eq!(roi.size_elements(), 10 * 20 * 30);
        roi.validate(&h).unwrap();
    }

    #[test]
    fn plane_restricts_one_axis() {
        let h = header([10, 20, 30, 1, 1]);
        let roi = Roi::plane(&h, 2, 5);
        assert_eq!(roi.extent(), [10, 20, 1, 1, 1]);
        roi.validate(&h).unwrap();
        assert_eq!(Roi::plane(&h, 0, 3).extent(), [1, 20, 30, 1, 1]);
    }

    #[test]
    fn rejects_reversed_and_oob() {
        let h = header([10, 20, 30, 1, 1]);
        let reversed = Roi {
            lb: [5, 0, 0, 0, 0],
            ub: [2, 20, 30, 1, 1],
        };
        assert!(reversed.validate(&h).is_err());

        let oob = Roi {
            lb: [0, 0, 0, 0, 0],
            ub: [11, 20, 30, 1, 1],
        };
        assert!(oob.validate(&h).is_err());
    }
}
