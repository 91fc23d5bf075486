use std::{
    collections::HashMap,
    ffi::OsString,
    fs::{self, OpenOptions},
    io::{self, Write},
    net::IpAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::{DateTime, Datelike, Utc};
use log::{error, info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

///
/// One banned address. `expires_at == None` is a permanent ban.
///
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub ip: IpAddr,
    #[serde(rename = "expiresAt", with = "expiry", default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    pub fn new(ip: IpAddr, expires_at: Option<DateTime<Utc>>) -> Self {
        Self { ip, expires_at }
    }

    pub fn is_permanent(&self) -> bool {
        self.expires_at.is_none()
    }

    /// An entry whose expiry equals `now` is already expired.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |t| t > now)
    }
}

///
/// On-disk layout:
///
/// ```text
/// {
///   "entries": [
///     { "ip": "203.0.113.7", "expiresAt": "2024-06-01T00:00:00Z" },
///     { "ip": "198.51.100.2", "expiresAt": "0001-01-01T00:00:00Z" }
///   ]
/// }
/// ```
///
#[derive(Deserialize)]
struct Document {
    #[serde(default)]
    entries: Vec<Entry>,
}

#[derive(Serialize)]
struct DocumentRef<'a> {
    entries: &'a [Entry],
}

///
/// Persistent IP blacklist.
///
/// Every mutation rewrites the backing file while the write lock is held, and
/// is undone in memory if that write fails. Reads filter expired entries, so
/// `cleanup` only bounds the file size.
///
/// There is no cross-process locking: two processes sharing one file will
/// overwrite each other.
///
#[derive(Debug)]
pub struct BlackList {
    entries: RwLock<Vec<Entry>>,
    path: PathBuf,
}

impl BlackList {
    ///
    /// Load the blacklist stored at `path`, creating an empty file if none exists.
    ///
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match load(&path) {
            Ok(entries) => {
                info!(target: "blacklist", "loaded {} entries from {}", entries.len(), path.display());
                entries
            }
            Err(Error::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                save(&path, &[])?;
                info!(target: "blacklist", "created empty blacklist {}", path.display());
                vec![]
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            entries: RwLock::new(entries),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    ///
    /// Ban `address` for `duration`, or forever when `duration` is zero.
    /// An existing entry for the address has its expiry replaced.
    ///
    pub fn add(&self, address: &str, duration: Duration) -> Result<()> {
        self.add_at(address, duration, Utc::now())
    }

    pub fn add_at(&self, address: &str, duration: Duration, now: DateTime<Utc>) -> Result<()> {
        let ip = parse_ip(address)?;
        let expires_at = expires_after(now, duration)?;

        let mut entries = self.entries.write();
        let undo = match entries.iter().position(|e| e.ip == ip) {
            Some(i) => Undo::Restore(i, std::mem::replace(&mut entries[i].expires_at, expires_at)),
            None => {
                entries.push(Entry::new(ip, expires_at));
                Undo::Pop
            }
        };

        if let Err(e) = save(&self.path, &entries) {
            error!("persist {} failed, add {} rolled back: {}", self.path.display(), ip, e);
            match undo {
                Undo::Restore(i, previous) => entries[i].expires_at = previous,
                Undo::Pop => {
                    entries.pop();
                }
            }
            return Err(e);
        }

        match expires_at {
            Some(t) => info!(target: "blacklist", "added {} until {}", ip, t),
            None => info!(target: "blacklist", "added {} permanently", ip),
        }
        Ok(())
    }

    ///
    /// Drop the entry for `address`. Removing an address that is not listed,
    /// or that is not an IP at all, succeeds without touching the file.
    ///
    pub fn remove(&self, address: &str) -> Result<()> {
        match address.parse::<IpAddr>() {
            Ok(ip) => self.remove_ip(ip),
            Err(_) => Ok(()),
        }
    }

    pub fn remove_ip(&self, ip: IpAddr) -> Result<()> {
        let mut entries = self.entries.write();
        let Some(i) = entries.iter().position(|e| e.ip == ip) else {
            return Ok(());
        };

        let removed = entries.remove(i);
        if let Err(e) = save(&self.path, &entries) {
            error!("persist {} failed, remove {} rolled back: {}", self.path.display(), ip, e);
            entries.insert(i, removed);
            return Err(e);
        }

        info!(target: "blacklist", "removed {}", ip);
        Ok(())
    }

    ///
    /// Whether `address` is currently banned. Anything that does not parse as
    /// an IP is never banned.
    ///
    pub fn contains(&self, address: &str) -> bool {
        address.parse().map_or(false, |ip| self.contains_ip(ip))
    }

    pub fn contains_ip(&self, ip: IpAddr) -> bool {
        self.contains_at(ip, Utc::now())
    }

    pub fn contains_at(&self, ip: IpAddr, now: DateTime<Utc>) -> bool {
        self.entries
            .read()
            .iter()
            .any(|e| e.ip == ip && e.is_active_at(now))
    }

    /// Active addresses in stored order.
    pub fn list_active(&self) -> Vec<IpAddr> {
        self.list_active_at(Utc::now())
    }

    pub fn list_active_at(&self, now: DateTime<Utc>) -> Vec<IpAddr> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.is_active_at(now))
            .map(|e| e.ip)
            .collect()
    }

    pub fn active_entries(&self) -> Vec<Entry> {
        self.active_entries_at(Utc::now())
    }

    pub fn active_entries_at(&self, now: DateTime<Utc>) -> Vec<Entry> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.is_active_at(now))
            .cloned()
            .collect()
    }

    ///
    /// Physically drop expired entries and return how many went. The file is
    /// only rewritten when something was dropped; a failed write is logged and
    /// the entries are kept.
    ///
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Utc::now())
    }

    pub fn cleanup_at(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write();
        let active: Vec<Entry> = entries
            .iter()
            .filter(|e| e.is_active_at(now))
            .cloned()
            .collect();

        let dropped = entries.len() - active.len();
        if dropped == 0 {
            return 0;
        }

        if let Err(e) = save(&self.path, &active) {
            warn!(target: "blacklist", "cleanup of {} skipped: {}", self.path.display(), e);
            return 0;
        }

        *entries = active;
        info!(target: "blacklist", "cleanup dropped {} expired entries", dropped);
        dropped
    }
}

enum Undo {
    Restore(usize, Option<DateTime<Utc>>),
    Pop,
}

fn parse_ip(address: &str) -> Result<IpAddr> {
    address
        .parse()
        .map_err(|_| Error::InvalidAddress(address.to_string()))
}

fn expires_after(now: DateTime<Utc>, duration: Duration) -> Result<Option<DateTime<Utc>>> {
    if duration.is_zero() {
        return Ok(None);
    }
    // RFC 3339 has four year digits; later instants would not load back.
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .filter(|t| t.year() <= 9999)
        .map(Some)
        .ok_or_else(|| Error::InvalidDuration(format!("{:?} is out of range", duration)))
}

fn load(path: &Path) -> Result<Vec<Entry>> {
    let data = fs::read(path)?;
    let document: Document = serde_json::from_slice(&data)?;
    Ok(merge_duplicates(document.entries))
}

///
/// Hand-edited files may list an address twice: keep the first position and
/// the last expiry.
///
fn merge_duplicates(entries: Vec<Entry>) -> Vec<Entry> {
    let mut index: HashMap<IpAddr, usize> = HashMap::with_capacity(entries.len());
    let mut merged: Vec<Entry> = Vec::with_capacity(entries.len());
    for entry in entries {
        match index.get(&entry.ip) {
            Some(&i) => merged[i].expires_at = entry.expires_at,
            None => {
                index.insert(entry.ip, merged.len());
                merged.push(entry);
            }
        }
    }
    merged
}

///
/// Write the whole document to `<path>.tmp` and rename it into place, so the
/// backing file is either the old document or the new one. On unix the parent
/// directory is synced afterwards so the rename itself is durable.
///
fn save(path: &Path, entries: &[Entry]) -> Result<()> {
    let data = serde_json::to_vec_pretty(&DocumentRef { entries })?;
    let tmp = tmp_path(path);

    let r = write_synced(&tmp, &data).and_then(|_| fs::rename(&tmp, path));
    if r.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    r?;
    sync_parent(path)?;
    Ok(())
}

#[cfg(unix)]
fn sync_parent(path: &Path) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::File::open(parent)?.sync_all()
}

// directories cannot be opened as files here.
#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> io::Result<()> {
    Ok(())
}

fn write_synced(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(data)?;
    file.sync_all()
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = OsString::from(path.as_os_str());
    tmp.push(".tmp");
    tmp.into()
}

///
/// `expiresAt` codec. Permanent is written as the zero instant
/// `0001-01-01T00:00:00Z`; reading accepts exactly that or `null`. Any other
/// instant, however old, is a real expiry.
///
mod expiry {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    const ZERO: &str = "0001-01-01T00:00:00Z";
    // 0001-01-01T00:00:00Z as a unix timestamp.
    const ZERO_SECS: i64 = -62_135_596_800;

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(t) => serializer.serialize_str(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            None => serializer.serialize_str(ZERO),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let Some(s) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        let t = DateTime::parse_from_rfc3339(&s)
            .map_err(de::Error::custom)?
            .with_timezone(&Utc);
        if t.timestamp() == ZERO_SECS && t.timestamp_subsec_nanos() == 0 {
            Ok(None)
        } else {
            Ok(Some(t))
        }
    }
}
