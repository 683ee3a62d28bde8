/// Interleave two 32-bit grid coordinates into a 64-bit key, x taking the
/// high bit of each pair. Keys sort in Z-order, which makes every tile at
/// every zoom a contiguous key range.
pub fn encode(x: u32, y: u32) -> u64 {
    let mut out = 0u64;
    for i in 0..32 {
        out |= (((x >> (31 - i)) & 1) as u64) << (63 - 2 * i);
        out |= (((y >> (31 - i)) & 1) as u64) << (62 - 2 * i);
    }
    out
}

pub fn decode(key: u64) -> (u32, u32) {
    let mut x = 0u32;
    let mut y = 0u32;
    for i in 0..32 {
        x |= (((key >> (63 - 2 * i)) & 1) as u32) << (31 - i);
        y |= (((key >> (62 - 2 * i)) & 1) as u32) << (31 - i);
    }
    (x, y)
}

/// Inclusive key range covered by tile (z, tx, ty): the NW corner's key
/// through the corner key plus s*s - 1, s being the tile's side in pixels.
pub fn tile_range(z: u32, tx: u32, ty: u32) -> (u64, u64) {
    if z == 0 {
        return (0, u64::MAX);
    }
    let shift = 32 - z;
    let start = encode(tx << shift, ty << shift);
    (start, start + ((1u64 << (2 * shift)) - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_placement() {
        assert_eq!(encode(1, 0), 0b10);
        assert_eq!(encode(0, 1), 0b01);
        assert_eq!(encode(u32::MAX, 0), 0xAAAA_AAAA_AAAA_AAAA);
        assert_eq!(encode(0, u32::MAX), 0x5555_5555_5555_5555);
        assert_eq!(encode(u32::MAX, u32::MAX), u64::MAX);
    }

    #[test]
    fn round_trip() {
        let samples = [
            (0, 0),
            (1, 2),
            (0xDEAD_BEEF, 0x1234_5678),
            (u32::MAX, 0),
            (0, u32::MAX),
            (u32::MAX, u32::MAX),
        ];
        for (x, y) in samples {
            assert_eq!(decode(encode(x, y)), (x, y));
        }
    }

    #[test]
    fn tile_range_brackets_the_tile() {
        let (z, tx, ty) = (14u32, 8192u32, 8191u32);
        let shift = 32 - z;
        let mask = (1u32 << shift) - 1;
        let (start, end) = tile_range(z, tx, ty);

        assert_eq!(start, encode(tx << shift, ty << shift));
        assert_eq!(end, encode((tx << shift) | mask, (ty << shift) | mask));
        for (dx, dy) in [(0, 0), (1, 1), (12_345, 999), (mask, mask)] {
            let key = encode((tx << shift) + dx, (ty << shift) + dy);
            assert!(start <= key && key <= end);
        }

        // Neighboring tiles stay outside the range.
        assert!(encode((tx << shift) - 1, ty << shift) < start);
        assert!(encode((tx + 1) << shift, ty << shift) > end);
    }

    #[test]
    fn zoom_zero_covers_everything() {
        assert_eq!(tile_range(0, 0, 0), (0, u64::MAX));
    }
}
