use crate::error::{IoErrorContext, RemoteStoreError};
use crate::protocol::{ProtocolVersion, MAX_STRING_LIST_SIZE, MAX_STRING_SIZE};
use crate::serialization::{Deserialize, Serialize};
use quern_store_core::StoreDir;
use std::collections::{BTreeMap, BTreeSet};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

// Operations without arguments use ().
impl Serialize for () {
    async fn serialize<W: AsyncWrite + Unpin>(
        &self,
        _writer: &mut W,
        _version: ProtocolVersion,
        _store_dir: &StoreDir,
    ) -> Result<(), RemoteStoreError> {
        Ok(())
    }
}

impl Serialize for u64 {
    async fn serialize<W: AsyncWrite + Unpin>(
        &self,
        writer: &mut W,
        _version: ProtocolVersion,
        _store_dir: &StoreDir,
    ) -> Result<(), RemoteStoreError> {
        writer
            .write_all(&self.to_le_bytes())
            .await
            .io_context("writing integer")
    }
}

impl Deserialize for u64 {
    async fn deserialize<R: AsyncRead + Unpin>(
        reader: &mut R,
        _version: ProtocolVersion,
        _store_dir: &StoreDir,
    ) -> Result<Self, RemoteStoreError> {
        let mut buf = [0; 8];
        reader
            .read_exact(&mut buf)
            .await
            .io_context("reading integer")?;
        Ok(u64::from_le_bytes(buf))
    }
}

impl Serialize for bool {
    async fn serialize<W: AsyncWrite + Unpin>(
        &self,
        writer: &mut W,
        version: ProtocolVersion,
        store_dir: &StoreDir,
    ) -> Result<(), RemoteStoreError> {
        (*self as u64).serialize(writer, version, store_dir).await
    }
}

impl Deserialize for bool {
    async fn deserialize<R: AsyncRead + Unpin>(
        reader: &mut R,
        version: ProtocolVersion,
        store_dir: &StoreDir,
    ) -> Result<Self, RemoteStoreError> {
        Ok(u64::deserialize(reader, version, store_dir).await? != 0)
    }
}

impl Serialize for [u8] {
    async fn serialize<W: AsyncWrite + Unpin>(
        &self,
        writer: &mut W,
        version: ProtocolVersion,
        store_dir: &StoreDir,
    ) -> Result<(), RemoteStoreError> {
        let len = self.len() as u64;
        len.serialize(writer, version, store_dir).await?;
        writer
            .write_all(self)
            .await
            .io_context("writing byte string")?;

        // Pad to the next 8-byte boundary.
        let padding = (8 - len % 8) % 8;
        if padding > 0 {
            writer
                .write_all(&[0u8; 8][..padding as usize])
                .await
                .io_context("writing byte string padding")?;
        }
        Ok(())
    }
}

impl Serialize for Vec<u8> {
    async fn serialize<W: AsyncWrite + Unpin>(
        &self,
        writer: &mut W,
        version: ProtocolVersion,
        store_dir: &StoreDir,
    ) -> Result<(), RemoteStoreError> {
        self.as_slice().serialize(writer, version, store_dir).await
    }
}

impl Deserialize for Vec<u8> {
    async fn deserialize<R: AsyncRead + Unpin>(
        reader: &mut R,
        version: ProtocolVersion,
        store_dir: &StoreDir,
    ) -> Result<Self, RemoteStoreError> {
        let len = u64::deserialize(reader, version, store_dir).await?;
        if len > MAX_STRING_SIZE {
            return Err(RemoteStoreError::decode(
                "byte string",
                format!("length {len} exceeds maximum {MAX_STRING_SIZE}"),
            ));
        }

        // Read data and padding in one go.
        let aligned = (len + 7) & !7;
        let mut buf = vec![0; aligned as usize];
        reader
            .read_exact(&mut buf)
            .await
            .io_context("reading byte string")?;
        buf.truncate(len as usize);
        Ok(buf)
    }
}

impl Serialize for str {
    async fn serialize<W: AsyncWrite + Unpin>(
        &self,
        writer: &mut W,
        version: ProtocolVersion,
        store_dir: &StoreDir,
    ) -> Result<(), RemoteStoreError> {
        self.as_bytes().serialize(writer, version, store_dir).await
    }
}

impl Serialize for String {
    async fn serialize<W: AsyncWrite + Unpin>(
        &self,
        writer: &mut W,
        version: ProtocolVersion,
        store_dir: &StoreDir,
    ) -> Result<(), RemoteStoreError> {
        self.as_str().serialize(writer, version, store_dir).await
    }
}

impl Deserialize for String {
    async fn deserialize<R: AsyncRead + Unpin>(
        reader: &mut R,
        version: ProtocolVersion,
        store_dir: &StoreDir,
    ) -> Result<Self, RemoteStoreError> {
        let bytes = Vec::<u8>::deserialize(reader, version, store_dir).await?;
        String::from_utf8(bytes).map_err(|e| RemoteStoreError::decode("string", e))
    }
}

async fn serialize_iter<'a, W, I, T>(
    iter: I,
    len: usize,
    writer: &mut W,
    version: ProtocolVersion,
    store_dir: &StoreDir,
) -> Result<(), RemoteStoreError>
where
    W: AsyncWrite + Unpin,
    I: Iterator<Item = &'a T>,
    T: Serialize + 'a,
{
    if len as u64 > MAX_STRING_LIST_SIZE {
        return Err(RemoteStoreError::decode(
            "collection",
            format!("length {len} exceeds maximum {MAX_STRING_LIST_SIZE}"),
        ));
    }

    (len as u64).serialize(writer, version, store_dir).await?;
    for item in iter {
        item.serialize(writer, version, store_dir).await?;
    }
    Ok(())
}

fn check_list_len(len: u64, location: &'static str) -> Result<(), RemoteStoreError> {
    if len > MAX_STRING_LIST_SIZE {
        return Err(RemoteStoreError::decode(
            location,
            format!("length {len} exceeds maximum {MAX_STRING_LIST_SIZE}"),
        ));
    }
    Ok(())
}

// Lists of byte strings: signatures, builder arguments, output names. A
// blanket Vec<T> impl would collide with the Vec<u8> byte-string encoding,
// so the one list shape the protocol uses is spelled out.
impl Serialize for [Vec<u8>] {
    async fn serialize<W: AsyncWrite + Unpin>(
        &self,
        writer: &mut W,
        version: ProtocolVersion,
        store_dir: &StoreDir,
    ) -> Result<(), RemoteStoreError> {
        serialize_iter(self.iter(), self.len(), writer, version, store_dir).await
    }
}

impl Serialize for Vec<Vec<u8>> {
    async fn serialize<W: AsyncWrite + Unpin>(
        &self,
        writer: &mut W,
        version: ProtocolVersion,
        store_dir: &StoreDir,
    ) -> Result<(), RemoteStoreError> {
        self.as_slice().serialize(writer, version, store_dir).await
    }
}

impl Deserialize for Vec<Vec<u8>> {
    async fn deserialize<R: AsyncRead + Unpin>(
        reader: &mut R,
        version: ProtocolVersion,
        store_dir: &StoreDir,
    ) -> Result<Self, RemoteStoreError> {
        let len = u64::deserialize(reader, version, store_dir).await?;
        check_list_len(len, "list")?;

        let mut result = Vec::with_capacity(len as usize);
        for _ in 0..len {
            result.push(Vec::<u8>::deserialize(reader, version, store_dir).await?);
        }
        Ok(result)
    }
}

// The wire has no set/list distinction; ordered containers make the
// encoding deterministic.
impl<T: Serialize> Serialize for BTreeSet<T> {
    async fn serialize<W: AsyncWrite + Unpin>(
        &self,
        writer: &mut W,
        version: ProtocolVersion,
        store_dir: &StoreDir,
    ) -> Result<(), RemoteStoreError> {
        serialize_iter(self.iter(), self.len(), writer, version, store_dir).await
    }
}

impl<T: Deserialize + Ord> Deserialize for BTreeSet<T> {
    async fn deserialize<R: AsyncRead + Unpin>(
        reader: &mut R,
        version: ProtocolVersion,
        store_dir: &StoreDir,
    ) -> Result<Self, RemoteStoreError> {
        let len = u64::deserialize(reader, version, store_dir).await?;
        check_list_len(len, "set")?;

        let mut result = BTreeSet::new();
        for _ in 0..len {
            result.insert(T::deserialize(reader, version, store_dir).await?);
        }
        Ok(result)
    }
}

impl<K: Serialize, V: Serialize> Serialize for BTreeMap<K, V> {
    async fn serialize<W: AsyncWrite + Unpin>(
        &self,
        writer: &mut W,
        version: ProtocolVersion,
        store_dir: &StoreDir,
    ) -> Result<(), RemoteStoreError> {
        check_list_len(self.len() as u64, "map")?;

        (self.len() as u64)
            .serialize(writer, version, store_dir)
            .await?;
        for (key, value) in self {
            key.serialize(writer, version, store_dir).await?;
            value.serialize(writer, version, store_dir).await?;
        }
        Ok(())
    }
}

impl<K: Deserialize + Ord, V: Deserialize> Deserialize for BTreeMap<K, V> {
    async fn deserialize<R: AsyncRead + Unpin>(
        reader: &mut R,
        version: ProtocolVersion,
        store_dir: &StoreDir,
    ) -> Result<Self, RemoteStoreError> {
        let len = u64::deserialize(reader, version, store_dir).await?;
        check_list_len(len, "map")?;

        let mut result = BTreeMap::new();
        for _ in 0..len {
            let key = K::deserialize(reader, version, store_dir).await?;
            let value = V::deserialize(reader, version, store_dir).await?;
            result.insert(key, value);
        }
        Ok(result)
    }
}
