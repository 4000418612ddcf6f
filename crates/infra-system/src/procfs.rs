// /proc readers (Linux) and their parsers
//
// Parsers are plain functions over text so they are testable on any platform.

use std::collections::HashMap;

/// Fields taken from /proc/<pid>/stat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatFields {
    pub tty_nr: i64,
    pub num_threads: u32,
}

/// Parse /proc/<pid>/stat. `comm` may contain spaces and parens, so fields
/// are counted from the last `)`.
pub fn parse_stat(contents: &str) -> Option<StatFields> {
    let rest = &contents[contents.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    // fields[0] is field 3 (state)
    let tty_nr = fields.get(4)?.parse().ok()?;
    let num_threads = fields.get(17)?.parse().ok()?;
    Some(StatFields { tty_nr, num_threads })
}

/// Decode a tty_nr device number into a terminal name
pub fn decode_tty(tty_nr: i64) -> Option<String> {
    if tty_nr <= 0 {
        return None;
    }
    let major = (tty_nr >> 8) & 0xfff;
    let minor = (tty_nr & 0xff) | ((tty_nr >> 12) & 0xfff00);
    match major {
        4 => Some(format!("tty{}", minor)),
        136..=143 => Some(format!("pts/{}", minor + (major - 136) * 256)),
        _ => Some(format!("dev({},{})", major, minor)),
    }
}

/// TCP state code for LISTEN in /proc/net/tcp
const TCP_LISTEN: &str = "0A";

/// Parse /proc/net/tcp or /proc/net/tcp6 into socket inode -> listening port
pub fn parse_listening_sockets(contents: &str) -> HashMap<u64, u16> {
    contents
        .lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.get(3).copied() != Some(TCP_LISTEN) {
                return None;
            }
            let port_hex = cols.get(1)?.rsplit(':').next()?;
            let port = u16::from_str_radix(port_hex, 16).ok()?;
            let inode = cols.get(9)?.parse::<u64>().ok()?;
            (inode != 0).then_some((inode, port))
        })
        .collect()
}

/// Inode from an fd link target like `socket:[12345]`
pub fn socket_inode(link: &str) -> Option<u64> {
    link.strip_prefix("socket:[")?.strip_suffix(']')?.parse().ok()
}

#[cfg(target_os = "linux")]
pub mod linux {
    use super::*;
    use std::path::PathBuf;

    pub fn read_stat(pid: u32) -> Option<StatFields> {
        let contents = std::fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
        parse_stat(&contents)
    }

    pub fn read_cwd(pid: u32) -> Option<PathBuf> {
        std::fs::read_link(format!("/proc/{}/cwd", pid)).ok()
    }

    /// Listening TCP ports owned by `pids` (port -> pid)
    pub fn listening_ports(pids: &[u32]) -> HashMap<u16, u32> {
        let mut sockets = HashMap::new();
        for table in ["/proc/net/tcp", "/proc/net/tcp6"] {
            if let Ok(contents) = std::fs::read_to_string(table) {
                sockets.extend(parse_listening_sockets(&contents));
            }
        }
        if sockets.is_empty() {
            return HashMap::new();
        }

        let mut ports = HashMap::new();
        for &pid in pids {
            let Ok(fds) = std::fs::read_dir(format!("/proc/{}/fd", pid)) else {
                continue;
            };
            for fd in fds.flatten() {
                let Ok(target) = std::fs::read_link(fd.path()) else {
                    continue;
                };
                if let Some(port) = target
                    .to_str()
                    .and_then(socket_inode)
                    .and_then(|inode| sockets.get(&inode))
                {
                    ports.insert(*port, pid);
                }
            }
        }
        ports
    }
}
