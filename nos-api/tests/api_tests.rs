//! API tests

use nos_api::*;

struct Flat {
    base: UserPtr,
    bytes: Vec<u8>,
}

impl UserMemory for Flat {
    fn copy_in(&self, src: UserPtr, dst: &mut [u8]) -> Result<()> {
        let start = src.checked_sub(self.base).ok_or(Error::BadUserAddress)?;
        let end = start + dst.len();
        let bytes = self.bytes.get(start..end).ok_or(Error::BadUserAddress)?;
        dst.copy_from_slice(bytes);
        Ok(())
    }

    fn copy_out(&mut self, src: &[u8], dst: UserPtr) -> Result<()> {
        let start = dst.checked_sub(self.base).ok_or(Error::BadUserAddress)?;
        let end = start + src.len();
        let bytes = self.bytes.get_mut(start..end).ok_or(Error::BadUserAddress)?;
        bytes.copy_from_slice(src);
        Ok(())
    }
}

#[test]
fn test_copy_in_str_stops_at_terminator() {
    let mut mem = Flat { base: 0x1000, bytes: vec![0; 64] };
    mem.copy_out(b"hello\0junk", 0x1000).unwrap();

    let mut buf = [0u8; 16];
    let len = mem.copy_in_str(0x1000, &mut buf).unwrap();
    assert_eq!(len, 6);
    assert_eq!(&buf[..len], b"hello\0");
}

#[test]
fn test_copy_in_str_reports_overflow() {
    let mut mem = Flat { base: 0x1000, bytes: vec![b'x'; 64] };
    mem.copy_out(b"abc", 0x1000).unwrap();

    let mut buf = [0u8; 4];
    assert_eq!(mem.copy_in_str(0x1000, &mut buf), Err(Error::NameTooLong));
}

#[test]
fn test_copy_in_str_faults_past_end() {
    let mem = Flat { base: 0x1000, bytes: vec![b'x'; 8] };
    let mut buf = [0u8; 32];
    assert_eq!(mem.copy_in_str(0x1000, &mut buf), Err(Error::BadUserAddress));
}

#[test]
fn test_pointer_round_trip() {
    let mut mem = Flat { base: 0x2000, bytes: vec![0; 64] };
    mem.copy_out_ptr(0xdead_beef, 0x2008).unwrap();
    assert_eq!(mem.copy_in_ptr(0x2008).unwrap(), 0xdead_beef);
    assert_eq!(mem.copy_in_ptr(0x1000), Err(Error::BadUserAddress));
}

#[test]
fn test_copy_out_str_requires_terminator() {
    let mut mem = Flat { base: 0, bytes: vec![0; 16] };
    assert_eq!(mem.copy_out_str(b"abc", 0), Err(Error::NameTooLong));
    assert_eq!(mem.copy_out_str(b"abc\0def", 4), Ok(4));
    assert_eq!(&mem.bytes[4..8], b"abc\0");
}

#[test]
fn test_error_display() {
    assert_eq!(Error::NoSuchChild.to_string(), "No child processes");
    assert_eq!(Error::TooManyProcesses.to_string(), "Too many processes in system");
}
