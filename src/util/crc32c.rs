const MASK_DELTA: u32 = 0xa282ead8;

pub fn crc32c_extend(init_crc: u32, data: &[u8]) -> u32 {
    crc32c::crc32c_append(init_crc, data)
}

pub fn crc32c_value(data: &[u8]) -> u32 {
    crc32c::crc32c(data)
}

// It is problematic to compute the CRC of a string that contains embedded
// CRCs, so CRCs stored somewhere (e.g. in files) are masked before being
// stored.
pub fn crc32c_mask(crc: u32) -> u32 {
    ((crc >> 15) | (crc << 17)).wrapping_add(MASK_DELTA)
}

pub fn crc32c_unmask(masked_crc: u32) -> u32 {
    let rot = masked_crc.wrapping_sub(MASK_DELTA);
    (rot >> 17) | (rot << 15)
}
