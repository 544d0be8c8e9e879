use std::sync::Arc;

use hopper_backend::{Ir, SharedBackend};
use hopper_core::error::Result;

use super::{Endpoint, IoContext, Source, Tables, Target};

/// An opaque file moved through the backend's byte refinements.
///
/// Under the bytes backend the payload passes through untouched; other
/// backends read and write it as an Arrow IPC stream.
#[derive(Debug)]
pub struct BytesFile {
    endpoint: Endpoint,
    backend: SharedBackend,
}

impl BytesFile {
    pub fn new(uri: &str, ctx: &IoContext) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::resolve("BytesFile", uri, &ctx.storage)?,
            backend: Arc::clone(&ctx.backend),
        })
    }
}

impl Source for BytesFile {
    fn name(&self) -> &str {
        self.endpoint.name()
    }

    fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    fn load(&self) -> Result<Tables> {
        let bytes = self.endpoint.read_all()?;
        Ok(vec![(None, self.backend.from_bytes(bytes)?)])
    }
}

impl Target for BytesFile {
    fn name(&self) -> &str {
        self.endpoint.name()
    }

    fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    fn write(&self, ir: &Ir) -> Result<()> {
        self.endpoint.write(self.backend.to_bytes(ir)?)
    }

    fn write_keyed(&self, key: &str, ir: &Ir) -> Result<()> {
        self.endpoint.keyed(key).write(self.backend.to_bytes(ir)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::testutil::{ctx, orders};
    use crate::storage::MemoryStorage;
    use hopper_backend::{build_backend, BackendKind};
    use hopper_core::error::Error;

    #[test]
    fn bytes_backend_copies_payload_verbatim() {
        let store = MemoryStorage::named("bytes-verbatim-test");
        store.insert("in.bin", &b"\x00\x01opaque"[..]);
        let ctx = IoContext::new(build_backend(BackendKind::Bytes).unwrap());
        let src = BytesFile::new("memory://bytes-verbatim-test/in.bin", &ctx).unwrap();
        let dst = BytesFile::new("memory://bytes-verbatim-test/out.bin", &ctx).unwrap();

        let tables = src.load().unwrap();
        dst.write(&tables[0].1).unwrap();
        assert_eq!(store.get("out.bin").unwrap(), store.get("in.bin").unwrap());
    }

    #[test]
    fn columnar_backend_reads_ipc_streams() {
        let store = MemoryStorage::named("bytes-ipc-test");
        let ctx = ctx();
        let file = BytesFile::new("memory://bytes-ipc-test/t.arrows", &ctx).unwrap();
        file.write(&ctx.backend.from_columnar(orders()).unwrap()).unwrap();
        assert!(store.get("t.arrows").is_some());

        let batch = ctx.backend.to_columnar(&file.load().unwrap()[0].1).unwrap();
        assert_eq!(batch, orders());

        store.insert("t.arrows", "plain text");
        assert!(matches!(file.load().unwrap_err(), Error::Conversion { .. }));
    }
}
