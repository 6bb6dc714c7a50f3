// MIT LICENSE
//
// Copyright (c) 2021 Dash Core Group
//
// Permission is hereby granted, free of charge, to any
// person obtaining a copy of this software and associated
// documentation files (the "Software"), to deal in the
// Software without restriction, including without
// limitation the rights to use, copy, modify, merge,
// publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software
// is furnished to do so, subject to the following
// conditions:
//
// The above copyright notice and this permission notice
// shall be included in all copies or substantial portions
// of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF
// ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED
// TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A
// PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT
// SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY
// CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION
// OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR
// IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

//! Read-path helpers over a root hash.

use storage::ChunkStore;

use crate::{
    cursor::{NodeCursor, SeekTarget},
    error::Error,
    hash::Hash,
    loader::ChunkLoader,
    node::Node,
    orderedkey::OrderedKey,
};

/// Looks a key up in a map tree.
pub fn map_get<S: ChunkStore>(
    loader: &ChunkLoader<S>,
    root: &Hash,
    key: &[u8],
) -> Result<Option<Vec<u8>>, Error> {
    let ordered = OrderedKey::ByBytes(key.to_vec());
    let cursor = NodeCursor::seek(loader, root, SeekTarget::Key(&ordered), 0)?;
    match cursor.node() {
        Node::Map(node) => {
            if !cursor.done() && node.key(cursor.idx()) == key {
                Ok(Some(node.value(cursor.idx()).to_vec()))
            } else {
                Ok(None)
            }
        }
        _ => Err(Error::InvalidInput(
            "map lookup against a tree that is not a map".to_string(),
        )),
    }
}

/// Every key/value pair of a map tree, in key order.
pub fn map_entries<S: ChunkStore>(
    loader: &ChunkLoader<S>,
    root: &Hash,
) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error> {
    let mut cursor = NodeCursor::seek_start(loader, root, 0)?;
    let mut entries = Vec::new();
    while !cursor.done() {
        match cursor.node() {
            Node::Map(node) => {
                let (key, value) = node.kv(cursor.idx());
                entries.push((key.to_vec(), value.to_vec()));
            }
            _ => {
                return Err(Error::InvalidInput(
                    "map iteration against a tree that is not a map".to_string(),
                ))
            }
        }
        cursor.advance()?;
    }
    Ok(entries)
}

/// Whether a set tree holds `item`.
pub fn set_contains<S: ChunkStore>(
    loader: &ChunkLoader<S>,
    root: &Hash,
    item: &[u8],
) -> Result<bool, Error> {
    let ordered = OrderedKey::ByBytes(item.to_vec());
    let cursor = NodeCursor::seek(loader, root, SeekTarget::Key(&ordered), 0)?;
    match cursor.node() {
        Node::Set(node) => Ok(!cursor.done() && node.item(cursor.idx()) == item),
        _ => Err(Error::InvalidInput(
            "set lookup against a tree that is not a set".to_string(),
        )),
    }
}

/// Every item of a set tree, in order.
pub fn set_items<S: ChunkStore>(
    loader: &ChunkLoader<S>,
    root: &Hash,
) -> Result<Vec<Vec<u8>>, Error> {
    let mut cursor = NodeCursor::seek_start(loader, root, 0)?;
    let mut items = Vec::new();
    while !cursor.done() {
        match cursor.node() {
            Node::Set(node) => items.push(node.item(cursor.idx()).to_vec()),
            _ => {
                return Err(Error::InvalidInput(
                    "set iteration against a tree that is not a set".to_string(),
                ))
            }
        }
        cursor.advance()?;
    }
    Ok(items)
}

/// The full contents of a blob tree.
pub fn blob_bytes<S: ChunkStore>(loader: &ChunkLoader<S>, root: &Hash) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();
    collect_blob(loader, root, &mut out)?;
    Ok(out)
}

fn collect_blob<S: ChunkStore>(
    loader: &ChunkLoader<S>,
    hash: &Hash,
    out: &mut Vec<u8>,
) -> Result<(), Error> {
    match loader.load_node(hash)? {
        Node::Blob(node) => out.extend_from_slice(node.bytes()),
        Node::Meta(meta) => {
            for idx in 0..meta.num_entries() {
                collect_blob(loader, meta.get_child_hash_by_entry(idx), out)?;
            }
        }
        _ => {
            return Err(Error::InvalidInput(
                "blob read against a tree that is not a blob".to_string(),
            ))
        }
    }
    Ok(())
}

/// Reads `len` bytes of a blob starting at `pos`, descending by element
/// position.
pub fn blob_read_at<S: ChunkStore>(
    loader: &ChunkLoader<S>,
    root: &Hash,
    pos: u64,
    len: usize,
) -> Result<Vec<u8>, Error> {
    let total = num_elements(loader, root)?;
    if pos + len as u64 > total {
        return Err(Error::KeyNotFound);
    }
    let mut cursor = NodeCursor::seek(loader, root, SeekTarget::Index(pos), 0)?;
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        match cursor.node() {
            Node::Blob(node) => {
                let take = (len - out.len()).min(node.num_entries() - cursor.idx());
                out.extend_from_slice(&node.bytes()[cursor.idx()..cursor.idx() + take]);
            }
            _ => {
                return Err(Error::InvalidInput(
                    "blob read against a tree that is not a blob".to_string(),
                ))
            }
        }
        // jump to the next leaf
        for _ in 0..cursor.node().num_entries() - cursor.idx() {
            cursor.advance()?;
        }
    }
    Ok(out)
}

/// User entries in the tree under `root`.
pub fn num_elements<S: ChunkStore>(loader: &ChunkLoader<S>, root: &Hash) -> Result<u64, Error> {
    Ok(loader.load_node(root)?.num_elements())
}

#[cfg(test)]
mod tests {
    use storage::MemoryStore;

    use super::*;
    use crate::{builder::TreeBuilder, config::ChunkConfig};

    fn test_config() -> ChunkConfig {
        ChunkConfig {
            window_size: 16,
            chunk_pattern: (1 << 8) - 1,
            max_chunk_size: 1 << 12,
        }
    }

    #[test]
    fn map_reads() {
        let store = MemoryStore::new();
        let loader = ChunkLoader::new(&store);
        let builder = TreeBuilder::new(&store, &loader, test_config());

        let entries: Vec<(Vec<u8>, Vec<u8>)> = (0..300u32)
            .map(|i| {
                (
                    format!("key{i:05}").into_bytes(),
                    format!("value{i}").into_bytes(),
                )
            })
            .collect();
        let root = builder.build_map(entries.clone()).unwrap();

        assert_eq!(
            map_get(&loader, &root, b"key00123").unwrap().unwrap(),
            b"value123"
        );
        assert_eq!(map_get(&loader, &root, b"key00123x").unwrap(), None);
        assert_eq!(map_entries(&loader, &root).unwrap(), entries);
        assert_eq!(num_elements(&loader, &root).unwrap(), 300);
    }

    #[test]
    fn set_reads() {
        let store = MemoryStore::new();
        let loader = ChunkLoader::new(&store);
        let builder = TreeBuilder::new(&store, &loader, test_config());

        let items: Vec<Vec<u8>> = (0..100u32).map(|i| format!("i{i:04}").into_bytes()).collect();
        let root = builder.build_set(items.clone()).unwrap();

        assert!(set_contains(&loader, &root, b"i0042").unwrap());
        assert!(!set_contains(&loader, &root, b"i9999").unwrap());
        assert_eq!(set_items(&loader, &root).unwrap(), items);
    }

    #[test]
    fn blob_reads() {
        let store = MemoryStore::new();
        let loader = ChunkLoader::new(&store);
        let builder = TreeBuilder::new(&store, &loader, test_config());

        let data: Vec<u8> = (0..30_000u32).map(|i| (i % 256) as u8).collect();
        let root = builder.build_blob(&data).unwrap();

        assert_eq!(blob_bytes(&loader, &root).unwrap(), data);
        assert_eq!(
            blob_read_at(&loader, &root, 10_000, 64).unwrap(),
            &data[10_000..10_064]
        );
        assert_eq!(num_elements(&loader, &root).unwrap(), 30_000);
        assert!(blob_read_at(&loader, &root, 29_990, 64).is_err());
    }

    #[test]
    fn kind_mismatches_are_rejected() {
        let store = MemoryStore::new();
        let loader = ChunkLoader::new(&store);
        let builder = TreeBuilder::new(&store, &loader, test_config());

        let map = builder.build_map(Vec::new()).unwrap();
        assert!(set_contains(&loader, &map, b"x").is_err());
        assert!(blob_bytes(&loader, &map).is_err());
    }
}
