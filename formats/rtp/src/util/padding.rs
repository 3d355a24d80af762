pub(crate) fn rtp_need_padding(size: usize) -> bool {
    size % 4 != 0
}

pub(crate) fn rtp_get_padding_size(size: usize) -> usize {
    (4 - (size % 4)) % 4
}

/// Extra octets needed to land `offset + size` on a multiple of `block_size`.
pub(crate) fn rtp_get_block_padding_size(offset: usize, size: usize, block_size: usize) -> usize {
    (block_size - ((offset + size) % block_size)) % block_size
}
