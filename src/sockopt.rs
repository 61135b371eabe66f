//! A backend reading the live tables of the kernel through the `getsockopt` interface of the
//! legacy x_tables modules. Reading requires `CAP_NET_ADMIN`.

use std::cell::Cell;
use std::os::unix::prelude::RawFd;
use std::path::PathBuf;

use nix::errno::Errno;

use crate::error::QueryError;
use crate::layout::{layout_for, Layout, TableInfo, GET_ENTRIES_HDR_LEN};
use crate::query::{TableBackend, TableCache, TableHandle};
use crate::table::{read_table_names, XT_TABLE_MAXNAMELEN};
use crate::{load_kernel_module, ChainPolicy, Counters, ProtocolFamily, Rule};

/// How many times a table is read again when it changes under our feet.
const MAX_ATTEMPTS: usize = 3;

/// A raw socket, only used as a handle on the x_tables sockopts.
#[derive(Debug)]
struct Socket {
    fd: RawFd,
}

impl Socket {
    fn open(family: ProtocolFamily) -> Result<Self, QueryError> {
        let domain = match family {
            ProtocolFamily::Ipv6 => libc::AF_INET6,
            _ => libc::AF_INET,
        };
        let fd =
            unsafe { libc::socket(domain, libc::SOCK_RAW | libc::SOCK_CLOEXEC, libc::IPPROTO_RAW) };
        if fd < 0 {
            return Err(QueryError::SocketOpenError(family, Errno::last()));
        }
        Ok(Socket { fd })
    }

    /// Runs a `getsockopt` request whose input and output share `buf`. Returns the length
    /// written by the kernel.
    fn get(&self, level: libc::c_int, name: libc::c_int, buf: &mut [u8]) -> Result<usize, Errno> {
        let mut len = buf.len() as libc::socklen_t;
        let ret = unsafe {
            libc::getsockopt(
                self.fd,
                level,
                name,
                buf.as_mut_ptr() as *mut libc::c_void,
                &mut len,
            )
        };
        if ret < 0 {
            return Err(Errno::last());
        }
        Ok(len as usize)
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        if let Err(e) = nix::unistd::close(self.fd) {
            error!("Failed to close the x_tables socket: {}", e);
        }
    }
}

fn table_name_buf(table: &str, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    buf[..table.len()].copy_from_slice(table.as_bytes());
    buf
}

fn sockopt_error(errno: Errno) -> QueryError {
    match errno {
        Errno::ENOENT => QueryError::NoSuchTable,
        Errno::EAGAIN => QueryError::ConcurrentUpdate,
        errno => QueryError::SockoptError(errno),
    }
}

fn get_info(sock: &Socket, layout: &Layout, table: &str) -> Result<TableInfo, QueryError> {
    let mut buf = table_name_buf(table, layout.info_size());
    sock.get(layout.level, layout.so_get_info, &mut buf)
        .map_err(sockopt_error)?;
    Ok(layout.decode_info(&buf)?)
}

fn get_entries(
    sock: &Socket,
    layout: &Layout,
    table: &str,
    info: &TableInfo,
) -> Result<Vec<u8>, QueryError> {
    let size = info.size as usize;
    let mut buf = table_name_buf(table, GET_ENTRIES_HDR_LEN + size);
    buf[XT_TABLE_MAXNAMELEN..XT_TABLE_MAXNAMELEN + 4].copy_from_slice(&info.size.to_ne_bytes());
    sock.get(layout.level, layout.so_get_entries, &mut buf)
        .map_err(sockopt_error)?;
    Ok(buf.split_off(GET_ENTRIES_HDR_LEN))
}

/// Reads the tables of one family from the kernel.
#[derive(Debug)]
pub struct KernelBackend {
    family: ProtocolFamily,
    layout: &'static Layout,
    modprobe: Option<PathBuf>,
    module_loaded: Cell<bool>,
}

impl KernelBackend {
    pub fn new(family: ProtocolFamily) -> Result<Self, QueryError> {
        let layout = layout_for(family).ok_or(QueryError::UnsupportedFamily(family))?;
        Ok(KernelBackend {
            family,
            layout,
            modprobe: None,
            module_loaded: Cell::new(false),
        })
    }

    /// Uses `program` instead of the kernel's module loader.
    pub fn with_modprobe(mut self, program: Option<PathBuf>) -> Self {
        self.modprobe = program;
        self
    }
}

impl TableBackend for KernelBackend {
    type Handle = KernelHandle;

    fn get_family(&self) -> ProtocolFamily {
        self.family
    }

    fn open(&self, table: &str) -> Result<KernelHandle, QueryError> {
        if table.len() >= XT_TABLE_MAXNAMELEN {
            return Err(QueryError::NoSuchTable);
        }
        let sock = Socket::open(self.family)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let info = get_info(&sock, self.layout, table)?;
            let blob = match get_entries(&sock, self.layout, table, &info) {
                Err(QueryError::ConcurrentUpdate) if attempt < MAX_ATTEMPTS => {
                    debug!("Table {} changed while being read, retrying", table);
                    continue;
                }
                res => res?,
            };
            let chains = self.layout.decode_entries(&info, &blob)?;
            debug!(
                "Read {} chains from table {} ({} bytes)",
                chains.len(),
                table,
                blob.len()
            );
            return Ok(KernelHandle {
                _sock: sock,
                cache: TableCache::new(chains),
            });
        }
    }

    fn table_names(&self) -> Result<Vec<String>, QueryError> {
        match self.family.table_names_path() {
            Some(path) => read_table_names(path),
            None => Err(QueryError::UnsupportedFamily(self.family)),
        }
    }

    fn load_kernel_module(&self) -> Result<(), QueryError> {
        if self.module_loaded.get() {
            return Ok(());
        }
        let module = self
            .family
            .kernel_module()
            .ok_or(QueryError::UnsupportedFamily(self.family))?;
        load_kernel_module(module, self.modprobe.as_deref())?;
        self.module_loaded.set(true);
        Ok(())
    }
}

/// A table read from the kernel. The socket stays open until the handle is dropped.
#[derive(Debug)]
pub struct KernelHandle {
    _sock: Socket,
    cache: TableCache,
}

impl TableHandle for KernelHandle {
    fn first_chain(&mut self) -> Result<Option<String>, QueryError> {
        self.cache.first_chain()
    }

    fn next_chain(&mut self) -> Result<Option<String>, QueryError> {
        self.cache.next_chain()
    }

    fn is_builtin(&self, chain: &str) -> bool {
        self.cache.is_builtin(chain)
    }

    fn get_policy(&self, chain: &str) -> Result<Option<(ChainPolicy, Counters)>, QueryError> {
        self.cache.get_policy(chain)
    }

    fn first_rule(&mut self, chain: &str) -> Result<Option<Rule>, QueryError> {
        self.cache.first_rule(chain)
    }

    fn next_rule(&mut self) -> Result<Option<Rule>, QueryError> {
        self.cache.next_rule()
    }
}
