// SPDX-FileCopyrightText: 2024 griff (original Nix.rs)
// SPDX-FileCopyrightText: 2025 Jörg Thalheim (Harmonia adaptation)
// SPDX-License-Identifier: EUPL-1.2 OR MIT

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::os::unix::ffi::OsStrExt as _;
use std::os::unix::fs::PermissionsExt as _;
use std::path::Path;

use bytes::{BufMut as _, Bytes, BytesMut};
use narwire_utils_base_encoding::Base;
use narwire_utils_hash::{Algorithm, Hash, HashingWriter};
use tracing::{debug, trace};
use walkdir::WalkDir;

use super::{NarEvent, NarNode, NarWriter};
use crate::error::{IoContext as _, NarError, NarOperation, Result};

/// Digests of one serialized archive, keyed by algorithm.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NarDigests(BTreeMap<Algorithm, Hash>);

impl NarDigests {
    pub fn get(&self, algorithm: Algorithm) -> Option<&Hash> {
        self.0.get(&algorithm)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Algorithm, &Hash)> {
        self.0.iter().map(|(algorithm, hash)| (*algorithm, hash))
    }

    pub fn raw(&self) -> BTreeMap<Algorithm, Vec<u8>> {
        self.iter()
            .map(|(algorithm, hash)| (algorithm, hash.digest_bytes().to_vec()))
            .collect()
    }

    pub fn encoded(&self, base: Base) -> BTreeMap<Algorithm, String> {
        self.iter()
            .map(|(algorithm, hash)| (algorithm, hash.to_base(base)))
            .collect()
    }
}

impl FromIterator<Hash> for NarDigests {
    fn from_iter<T: IntoIterator<Item = Hash>>(iter: T) -> Self {
        NarDigests(iter.into_iter().map(|hash| (hash.algorithm(), hash)).collect())
    }
}

/// A NAR serialization session.
///
/// Each call to [`serialize`](Nar::serialize) (or its variants) hashes the
/// archive it produces with every configured algorithm; the digest accessors
/// report the digests of the last archive that was produced successfully
/// and may be read any number of times.
///
/// ```no_run
/// use narwire_nar::Nar;
/// use narwire_utils_hash::Algorithm;
///
/// let mut nar = Nar::new([Algorithm::SHA256]).exclude_vcs(true);
/// nar.serialize("/some/checkout")?;
/// println!("{}", nar.hexdigest()[&Algorithm::SHA256]);
/// # Ok::<(), narwire_nar::NarError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Nar {
    algorithms: Vec<Algorithm>,
    exclude_vcs: bool,
    vcs_type: Option<String>,
    debug: bool,
    digests: NarDigests,
}

impl Nar {
    pub fn new(algorithms: impl IntoIterator<Item = Algorithm>) -> Self {
        Self {
            algorithms: algorithms.into_iter().collect(),
            exclude_vcs: false,
            vcs_type: Some("git".to_owned()),
            debug: false,
            digests: NarDigests::default(),
        }
    }

    /// Skip `.{vcs_type}` entries in every directory.
    pub fn exclude_vcs(mut self, exclude_vcs: bool) -> Self {
        self.exclude_vcs = exclude_vcs;
        self
    }

    pub fn vcs_type(mut self, vcs_type: Option<impl Into<String>>) -> Self {
        self.vcs_type = vcs_type.map(Into::into);
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn algorithms(&self) -> &[Algorithm] {
        &self.algorithms
    }

    fn excluded_name(&self) -> Option<OsString> {
        match (&self.vcs_type, self.exclude_vcs) {
            (Some(vcs_type), true) if !vcs_type.is_empty() => Some(format!(".{vcs_type}").into()),
            _ => None,
        }
    }

    /// Serialize the tree rooted at `path` into memory.
    pub fn serialize(&mut self, path: impl AsRef<Path>) -> Result<Bytes> {
        let mut buffer = BytesMut::new().writer();
        self.serialize_to(path, &mut buffer)?;
        Ok(buffer.into_inner().freeze())
    }

    /// Serialize the tree rooted at `path` into `writer`, returning the
    /// archive size.
    pub fn serialize_to<W: Write>(&mut self, path: impl AsRef<Path>, writer: W) -> Result<u64> {
        let path = path.as_ref();
        debug!(path = %path.display(), algorithms = ?self.algorithms, "serializing");
        self.run(path, writer, |nar, writer| nar.dump(path, writer))
    }

    /// Serialize an in-memory tree.
    pub fn serialize_node(&mut self, node: &NarNode) -> Result<Bytes> {
        let mut buffer = BytesMut::new().writer();
        self.run(Path::new(""), &mut buffer, |_, writer| writer.write_node(node))?;
        Ok(buffer.into_inner().freeze())
    }

    fn run<W, F>(&mut self, root: &Path, writer: W, body: F) -> Result<u64>
    where
        W: Write,
        F: FnOnce(&Self, &mut NarWriter<HashingWriter<W>>) -> Result<()>,
    {
        self.digests = NarDigests::default();
        let mut nar = NarWriter::new(HashingWriter::new(writer, &self.algorithms))
            .with_root(root)
            .with_debug(self.debug);
        body(self, &mut nar)?;
        let hashing = nar.finish()?;
        let size = hashing.bytes_written();
        let (_, hashes) = hashing.finish();
        self.digests = hashes.into_iter().collect();
        Ok(size)
    }

    fn dump<W: Write>(&self, root: &Path, writer: &mut NarWriter<W>) -> Result<()> {
        let excluded = self.excluded_name();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .follow_root_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                let skip = entry.depth() > 0
                    && excluded.as_deref().is_some_and(|name| entry.file_name() == name);
                if skip {
                    trace!(path = %entry.path().display(), "skipping VCS entry");
                }
                !skip
            });

        let mut open_dirs = 0usize;
        for entry in walker {
            let entry = entry?;
            while open_dirs > entry.depth() {
                writer.write_event(NarEvent::<&[u8]>::EndDirectory)?;
                open_dirs -= 1;
            }

            let path = entry.path();
            let name = if entry.depth() == 0 {
                Bytes::new()
            } else {
                Bytes::copy_from_slice(entry.file_name().as_bytes())
            };
            let file_type = entry.file_type();
            if file_type.is_dir() {
                writer.write_event(NarEvent::<&[u8]>::StartDirectory { name })?;
                open_dirs += 1;
            } else if file_type.is_symlink() {
                let target = fs::read_link(path).io_context(NarOperation::ReadLink, path)?;
                writer.write_event(NarEvent::<&[u8]>::Symlink {
                    name,
                    target: Bytes::copy_from_slice(target.as_os_str().as_bytes()),
                })?;
            } else if file_type.is_file() {
                let metadata = entry
                    .metadata()
                    .map_err(NarError::from)?;
                let executable = metadata.permissions().mode() & 0o111 != 0;
                let file = fs::File::open(path).io_context(NarOperation::OpenFile, path)?;
                writer.write_event(NarEvent::File {
                    name,
                    executable,
                    size: metadata.len(),
                    reader: file,
                })?;
            } else {
                return Err(NarError::UnsupportedFileType(path.to_owned()));
            }
        }
        while open_dirs > 0 {
            writer.write_event(NarEvent::<&[u8]>::EndDirectory)?;
            open_dirs -= 1;
        }
        Ok(())
    }

    pub fn digests(&self) -> &NarDigests {
        &self.digests
    }

    /// Raw digests of the last archive. Empty before the first successful
    /// serialization and after a failed one.
    pub fn digest(&self) -> BTreeMap<Algorithm, Vec<u8>> {
        self.digests.raw()
    }

    pub fn hexdigest(&self) -> BTreeMap<Algorithm, String> {
        self.digests.encoded(Base::Hex)
    }

    /// Nix base32, as printed by `nix-hash --base32`.
    pub fn b32digest(&self) -> BTreeMap<Algorithm, String> {
        self.digests.encoded(Base::NixBase32)
    }

    pub fn b64digest(&self) -> BTreeMap<Algorithm, String> {
        self.digests.encoded(Base::Base64)
    }
}

/// Hex digests of the archive of `path` for each of `algorithms`.
pub fn compute_nar_hashes(
    path: impl AsRef<Path>,
    algorithms: &[Algorithm],
) -> Result<BTreeMap<Algorithm, String>> {
    let mut nar = Nar::new(algorithms.iter().copied());
    nar.serialize_to(path, std::io::sink())?;
    Ok(nar.hexdigest())
}

pub fn nar_serialize(
    path: impl AsRef<Path>,
    exclude_vcs: bool,
    vcs_type: Option<&str>,
) -> Result<Bytes> {
    Nar::new([Algorithm::SHA256])
        .exclude_vcs(exclude_vcs)
        .vcs_type(vcs_type)
        .serialize(path)
}

#[cfg(test)]
mod unittests {
    use std::os::unix::net::UnixListener;

    use hex_literal::hex;
    use narwire_utils_test::{CanonicalTempDir, TreeBuilder, example_tree, vcs_tree};
    use rstest::rstest;

    use super::*;

    const EXAMPLE_SHA256: [u8; 32] =
        hex!("c196b965e5024e8b6132f5e36bd9e12c7da4ac736db4635b75ee64b4014f2094");
    const EXAMPLE_SHA1: [u8; 20] = hex!("8da0666665a29960b70c3b7eec953c56a6d553c9");

    #[test]
    fn test_example_tree() {
        let dir = CanonicalTempDir::new().unwrap();
        let root = example_tree(dir.path()).unwrap();

        let mut nar = Nar::new([Algorithm::SHA256, Algorithm::SHA1]);
        let bytes = nar.serialize(&root).unwrap();

        assert_eq!(bytes.len(), 680);
        assert!(bytes[8..].starts_with(b"nix-archive-1"));
        assert_eq!(nar.digest()[&Algorithm::SHA256], EXAMPLE_SHA256);
        assert_eq!(nar.digest()[&Algorithm::SHA1], EXAMPLE_SHA1);
        assert_eq!(
            nar.hexdigest()[&Algorithm::SHA256],
            "c196b965e5024e8b6132f5e36bd9e12c7da4ac736db4635b75ee64b4014f2094"
        );
        assert_eq!(
            nar.b32digest()[&Algorithm::SHA256],
            "15109w0v8r7ffmdn7d3dffna8z9cw7cnpqzm69hqnkh2wmjvk5n1"
        );
        assert_eq!(
            nar.b64digest()[&Algorithm::SHA256],
            "wZa5ZeUCTothMvXja9nhLH2krHNttGNbde5ktAFPIJQ="
        );
        assert_eq!(
            nar.b32digest()[&Algorithm::SHA1],
            "r59xb9jn7jayqziv1jvn16d2cmk6d84d"
        );
        assert_eq!(
            nar.b64digest()[&Algorithm::SHA1],
            "jaBmZmWimWC3DDt+7JU8VqbVU8k="
        );
    }

    #[test]
    fn test_digest_reads_are_repeatable() {
        let dir = CanonicalTempDir::new().unwrap();
        let root = example_tree(dir.path()).unwrap();
        let mut nar = Nar::new([Algorithm::SHA256]);
        nar.serialize(&root).unwrap();
        assert_eq!(nar.hexdigest(), nar.hexdigest());
        assert_eq!(nar.digest(), nar.digest());
    }

    #[test]
    fn test_serialize_resets_digests() {
        let dir = CanonicalTempDir::new().unwrap();
        let root = example_tree(dir.path()).unwrap();
        let mut nar = Nar::new([Algorithm::SHA256]);
        nar.serialize(root.join("baz")).unwrap();
        nar.serialize(&root).unwrap();
        assert_eq!(nar.digest()[&Algorithm::SHA256], EXAMPLE_SHA256);
    }

    #[test]
    fn test_serialize_matches_node() {
        let dir = CanonicalTempDir::new().unwrap();
        let root = example_tree(dir.path()).unwrap();
        let node = NarNode::directory([
            ("bar", NarNode::directory([("exe", NarNode::regular(true, "run"))])),
            ("baz", NarNode::regular(false, "data")),
        ]);

        let mut nar = Nar::new([Algorithm::SHA256]);
        let from_disk = nar.serialize(&root).unwrap();
        let from_node = nar.serialize_node(&node).unwrap();
        assert_eq!(from_disk, from_node);
        assert_eq!(nar.digest()[&Algorithm::SHA256], EXAMPLE_SHA256);
    }

    #[test]
    fn test_serialize_to_streams_same_bytes() {
        let dir = CanonicalTempDir::new().unwrap();
        let root = example_tree(dir.path()).unwrap();
        let mut nar = Nar::new([Algorithm::SHA1]);
        let mut out = Vec::new();
        let size = nar.serialize_to(&root, &mut out).unwrap();
        assert_eq!(size, out.len() as u64);
        assert_eq!(out, nar.serialize(&root).unwrap());
        assert_eq!(nar.digest()[&Algorithm::SHA1], EXAMPLE_SHA1);
    }

    #[test]
    fn test_determinism_across_creation_order() {
        let dir = CanonicalTempDir::new().unwrap();
        let first = TreeBuilder::new(dir.path().join("first")).unwrap();
        first
            .file("a", b"1", 0o644)
            .unwrap()
            .file("z/b", b"2", 0o755)
            .unwrap()
            .symlink("m", "a")
            .unwrap();
        let second = TreeBuilder::new(dir.path().join("second")).unwrap();
        second
            .symlink("m", "a")
            .unwrap()
            .file("z/b", b"2", 0o700)
            .unwrap()
            .file("a", b"1", 0o600)
            .unwrap();

        let mut nar = Nar::new([Algorithm::SHA256]);
        let one = nar.serialize(first.root()).unwrap();
        let two = nar.serialize(second.root()).unwrap();
        assert_eq!(one, two);
    }

    #[rstest]
    #[case::exclude_git(true, Some("git"), hex!("f1b641c46888a1002e340c9425ef8ec890605858"))]
    #[case::no_exclusion(false, Some("git"), hex!("cc199e849878c3f13332fa6d8a24d44ab2e5a4fa"))]
    #[case::no_vcs_type(true, None, hex!("cc199e849878c3f13332fa6d8a24d44ab2e5a4fa"))]
    fn test_vcs_exclusion(
        #[case] exclude_vcs: bool,
        #[case] vcs_type: Option<&str>,
        #[case] sha1: [u8; 20],
    ) {
        let dir = CanonicalTempDir::new().unwrap();
        let root = vcs_tree(dir.path()).unwrap();
        let mut nar = Nar::new([Algorithm::SHA1])
            .exclude_vcs(exclude_vcs)
            .vcs_type(vcs_type);
        let bytes = nar.serialize(&root).unwrap();
        assert_eq!(nar.digest()[&Algorithm::SHA1], sha1);
        if exclude_vcs && vcs_type.is_some() {
            assert!(!bytes.windows(4).any(|w| w == b".git"));
            assert!(bytes.windows(4).any(|w| w == b".svn"));
        }
    }

    #[test]
    fn test_vcs_exclusion_keeps_root() {
        let dir = CanonicalTempDir::new().unwrap();
        let tree = TreeBuilder::new(dir.path().join(".git")).unwrap();
        tree.file("HEAD", b"ref", 0o644).unwrap();
        let excluded = nar_serialize(tree.root(), true, Some("git")).unwrap();
        let plain = nar_serialize(tree.root(), false, Some("git")).unwrap();
        assert_eq!(excluded, plain);
    }

    #[test]
    fn test_unsupported_file_type() {
        let dir = CanonicalTempDir::new().unwrap();
        let tree = TreeBuilder::new(dir.path().join("tree")).unwrap();
        tree.file("a", b"a", 0o644).unwrap();
        let _listener = UnixListener::bind(tree.root().join("socket")).unwrap();

        let mut nar = Nar::new([Algorithm::SHA256]);
        nar.serialize(dir.path().join("tree/a")).unwrap();
        assert!(!nar.digest().is_empty());

        let err = nar.serialize(tree.root()).unwrap_err();
        match err {
            NarError::UnsupportedFileType(path) => assert_eq!(path, tree.root().join("socket")),
            other => panic!("unexpected error {other}"),
        }
        assert!(nar.digest().is_empty());
    }

    #[test]
    fn test_missing_path() {
        let dir = CanonicalTempDir::new().unwrap();
        let err = Nar::new([Algorithm::SHA256])
            .serialize(dir.path().join("missing"))
            .unwrap_err();
        assert!(matches!(err, NarError::Io { .. }), "{err}");
    }

    #[test]
    fn test_compute_nar_hashes() {
        let dir = CanonicalTempDir::new().unwrap();
        let root = example_tree(dir.path()).unwrap();
        let hashes = compute_nar_hashes(&root, &[Algorithm::SHA1, Algorithm::SHA256]).unwrap();
        assert_eq!(
            hashes,
            BTreeMap::from([
                (
                    Algorithm::SHA1,
                    "8da0666665a29960b70c3b7eec953c56a6d553c9".to_owned()
                ),
                (
                    Algorithm::SHA256,
                    "c196b965e5024e8b6132f5e36bd9e12c7da4ac736db4635b75ee64b4014f2094".to_owned()
                ),
            ])
        );
    }

    #[test]
    fn test_single_file_root() {
        let dir = CanonicalTempDir::new().unwrap();
        let tree = TreeBuilder::new(dir.path()).unwrap();
        tree.file("data", b"data", 0o644).unwrap();
        let bytes = nar_serialize(tree.root().join("data"), false, None).unwrap();
        assert_eq!(bytes.len(), 120);
        assert_eq!(
            Algorithm::SHA256.digest(&bytes).digest_bytes(),
            hex!("55503380517132c9f1909c9417b073c991badec01cff327b1239258d8b421df3")
        );
    }
}
