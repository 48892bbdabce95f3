//! In-process LDAPS server for tests.
//!
//! Understands just enough BER to answer simple binds, single-entry
//! searches and unbinds for a fixed set of users.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio_rustls::rustls::{self, ServerConfig};
use tokio_rustls::TlsAcceptor;

use keygate_trust::TrustPool;

use super::DirectoryBindConfig;

const TAG_BIND_REQUEST: u8 = 0x60;
const TAG_BIND_RESPONSE: u8 = 0x61;
const TAG_UNBIND_REQUEST: u8 = 0x42;
const TAG_SEARCH_REQUEST: u8 = 0x63;
const TAG_SEARCH_ENTRY: u8 = 0x64;
const TAG_SEARCH_DONE: u8 = 0x65;

pub(crate) struct FakeDirectory {
    port: u16,
    ca_pem: String,
}

impl FakeDirectory {
    pub(crate) const SERVICE_DN: &'static str = "cn=svc,dc=example,dc=com";
    pub(crate) const SERVICE_PASSWORD: &'static str = "svc-secret";
    pub(crate) const ALICE_DN: &'static str = "uid=alice,ou=users,dc=example,dc=com";
    pub(crate) const ALICE_PASSWORD: &'static str = "wonderland";
    /// Binds as this DN fail with `unwillingToPerform` (53).
    pub(crate) const UNWILLING_DN: &'static str = "uid=frozen,ou=users,dc=example,dc=com";
    pub(crate) const USERS_BASE: &'static str = "ou=users,dc=example,dc=com";
    /// Searches under this base never return an entry.
    pub(crate) const EMPTY_BASE: &'static str = "ou=robots,dc=example,dc=com";

    pub(crate) async fn start() -> Self {
        let key = rcgen::KeyPair::generate().unwrap();
        let cert = rcgen::CertificateParams::new(vec!["localhost".to_string()])
            .unwrap()
            .self_signed(&key)
            .unwrap();

        let provider = rustls::crypto::ring::default_provider();
        let server_config = ServerConfig::builder_with_provider(Arc::new(provider))
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_no_client_auth()
            .with_single_cert(
                vec![cert.der().clone()],
                PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key.serialize_der())),
            )
            .unwrap();
        let acceptor = TlsAcceptor::from(Arc::new(server_config));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    if let Ok(tls) = acceptor.accept(tcp).await {
                        let _ = serve(tls).await;
                    }
                });
            }
        });

        Self {
            port,
            ca_pem: cert.pem(),
        }
    }

    /// PEM of the server's self-signed certificate.
    pub(crate) fn ca_pem(&self) -> &str {
        &self.ca_pem
    }

    /// Config trusting this server, searching [`Self::USERS_BASE`].
    pub(crate) fn config(&self) -> DirectoryBindConfig {
        let mut config = DirectoryBindConfig::new(
            &format!("ldaps://localhost:{}", self.port),
            Self::SERVICE_DN,
            Self::SERVICE_PASSWORD,
        )
        .with_root_cas(TrustPool::from_pem(self.ca_pem.as_bytes()).unwrap());
        config.timeout_secs = 5;
        config.user_search_base_dns = vec![Self::USERS_BASE.to_string()];
        config
    }
}

async fn serve<S>(mut stream: S) -> std::io::Result<()>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    while let Some(message) = read_message(&mut stream).await? {
        let Some((_, msgid, rest)) = split_tlv(&message) else {
            return Ok(());
        };
        let Some((op, body, _)) = split_tlv(rest) else {
            return Ok(());
        };

        let mut reply = Vec::new();
        match op {
            TAG_BIND_REQUEST => {
                let rc = answer_bind(body);
                reply.extend(envelope(msgid, TAG_BIND_RESPONSE, &result(rc)));
            },
            TAG_SEARCH_REQUEST => {
                let base = split_tlv(body).map(|(_, v, _)| v).unwrap_or_default();
                let wants_alice = contains(body, b"alice");
                if base == FakeDirectory::USERS_BASE.as_bytes() && wants_alice {
                    reply.extend(envelope(msgid, TAG_SEARCH_ENTRY, &alice_entry()));
                }
                reply.extend(envelope(msgid, TAG_SEARCH_DONE, &result(0)));
            },
            TAG_UNBIND_REQUEST => return stream.shutdown().await,
            _ => return Ok(()),
        }
        stream.write_all(&reply).await?;
        stream.flush().await?;
    }
    Ok(())
}

fn answer_bind(body: &[u8]) -> u8 {
    let Some((_, _version, rest)) = split_tlv(body) else {
        return 2;
    };
    let Some((_, name, rest)) = split_tlv(rest) else {
        return 2;
    };
    let Some((_, password, _)) = split_tlv(rest) else {
        return 2;
    };

    let accepted = [
        (FakeDirectory::SERVICE_DN, FakeDirectory::SERVICE_PASSWORD),
        (FakeDirectory::ALICE_DN, FakeDirectory::ALICE_PASSWORD),
    ];
    if name == FakeDirectory::UNWILLING_DN.as_bytes() {
        53
    } else if accepted
        .iter()
        .any(|(dn, pw)| name == dn.as_bytes() && password == pw.as_bytes())
    {
        0
    } else {
        49
    }
}

fn alice_entry() -> Vec<u8> {
    let groups = [
        tlv(0x04, b"cn=admins,ou=groups,dc=example,dc=com"),
        tlv(0x04, b"ou=raw,dc=example"),
    ]
    .concat();
    let member_of = tlv(0x30, &[tlv(0x04, b"memberOf"), tlv(0x31, &groups)].concat());
    [
        tlv(0x04, FakeDirectory::ALICE_DN.as_bytes()),
        tlv(0x30, &member_of),
    ]
    .concat()
}

fn result(rc: u8) -> Vec<u8> {
    [tlv(0x0a, &[rc]), tlv(0x04, b""), tlv(0x04, b"")].concat()
}

fn envelope(msgid: &[u8], op: u8, body: &[u8]) -> Vec<u8> {
    tlv(0x30, &[tlv(0x02, msgid), tlv(op, body)].concat())
}

fn tlv(tag: u8, value: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    let len = value.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = len.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        out.push(0x80 | (bytes.len() - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }
    out.extend_from_slice(value);
    out
}

/// Splits the first TLV off `buf`, returning `(tag, value, rest)`.
fn split_tlv(buf: &[u8]) -> Option<(u8, &[u8], &[u8])> {
    let (&tag, rest) = buf.split_first()?;
    let (&first, rest) = rest.split_first()?;
    let (len, rest) = if first < 0x80 {
        (first as usize, rest)
    } else {
        let n = (first & 0x7f) as usize;
        let len_bytes = rest.get(..n)?;
        let len = len_bytes.iter().fold(0usize, |acc, b| (acc << 8) | *b as usize);
        (len, &rest[n..])
    };
    let value = rest.get(..len)?;
    Some((tag, value, &rest[len..]))
}

/// Reads one LDAPMessage, returning the content of its outer SEQUENCE.
async fn read_message<S>(stream: &mut S) -> std::io::Result<Option<Vec<u8>>>
where
    S: tokio::io::AsyncRead + Unpin,
{
    let mut header = [0u8; 2];
    if stream.read_exact(&mut header).await.is_err() {
        return Ok(None);
    }
    let len = if header[1] < 0x80 {
        header[1] as usize
    } else {
        let mut len_bytes = vec![0u8; (header[1] & 0x7f) as usize];
        stream.read_exact(&mut len_bytes).await?;
        len_bytes.iter().fold(0usize, |acc, b| (acc << 8) | *b as usize)
    };
    let mut content = vec![0u8; len];
    stream.read_exact(&mut content).await?;
    Ok(Some(content))
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
