use arbor_result::{Error, Result};
use bitcode::{Decode, Encode};
use std::fmt;

/// Index accounting record, stored beside the root page.
///
/// `page_index` allocates page URLs and only ever grows. `generation`
/// increments once per committed mutation; replica recovery adopts the
/// highest generation it can find and replays pages into lagging groups.
/// Field declaration order is the wire order.
#[derive(Clone, Copy, Debug, Default, Encode, Decode, PartialEq, Eq)]
pub struct IndexMeta {
    pub page_index: u64,
    pub num_pages: u64,
    pub num_leaf_pages: u64,
    pub generation: u64,
}

impl IndexMeta {
    pub fn load(bytes: &[u8]) -> Result<Self> {
        bitcode::decode(bytes).map_err(|_| Error::Corrupt("meta decode"))
    }

    pub fn save(&self) -> Vec<u8> {
        bitcode::encode(self)
    }
}

impl fmt::Display for IndexMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "page_index: {}, num_pages: {}, num_leaf_pages: {}, generation: {}",
            self.page_index, self.num_pages, self.num_leaf_pages, self.generation
        )
    }
}
