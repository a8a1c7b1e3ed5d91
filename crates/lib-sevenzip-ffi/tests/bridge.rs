//! End-to-end tests against the stub engine in `common`.

mod common;

use common::{take_events, take_slots, Event};
use lib_archive_types::{
    ArchiveFormat, AskMode, FileTimeType, HResult, HostResult, OperationResult, PropId, PropVariant, PropertyInfo,
    UpdateItemInfo, VarType,
};
use lib_sevenzip_ffi::{
    ArchiveExtractCallback, ArchiveOpenCallback, ArchiveUpdateCallback, BridgeError, FixedPassword, InArchive,
    NoOpenCallback, OutArchive, PasswordProvider, ReadStream, SeekableReadStream, SeekableWriteStream,
    SequentialInStream, SequentialOutStream, SharedBuffer, VolumeProvider, WriteStream,
};
use std::io::Cursor;

const CONTENT: &[u8] = b"a\nbb\nccc\nd\ne\nf";

fn opened(manager: &std::sync::Arc<lib_sevenzip_ffi::LibraryManager>) -> InArchive {
    let mut archive = InArchive::create(manager, ArchiveFormat::SevenZip).unwrap();
    let outcome = archive
        .open(SeekableReadStream::new(Cursor::new(CONTENT.to_vec())), None, NoOpenCallback)
        .unwrap();
    assert_eq!(outcome.status, HResult::S_OK);
    take_events();
    archive
}

/// Extract callback that collects each item into its own buffer.
#[derive(Default)]
struct Collect {
    requested: Vec<(u32, AskMode)>,
    buffers: Vec<SharedBuffer>,
    results: Vec<OperationResult>,
}

impl ArchiveExtractCallback for Collect {
    fn get_stream(&mut self, index: u32, mode: AskMode) -> HostResult<Option<Box<dyn SequentialOutStream>>> {
        self.requested.push((index, mode));
        let buffer = SharedBuffer::new();
        self.buffers.push(buffer.clone());
        Ok(Some(Box::new(buffer)))
    }

    fn set_operation_result(&mut self, result: OperationResult) -> HostResult<()> {
        self.results.push(result);
        Ok(())
    }
}

#[test]
fn test_missing_symbol_yields_no_proxy() {
    take_events();
    let manager = common::manager_without(&["IInArchive_Open"]);

    let err = InArchive::create(&manager, ArchiveFormat::SevenZip).unwrap_err();
    assert_eq!(err, BridgeError::symbol_not_found("IInArchive_Open"));
    assert!(err.is_fatal());
    // The family is checked before any object is created.
    assert!(take_events().is_empty());
}

#[test]
fn test_extract_selected_items() {
    let manager = common::manager();
    let archive = opened(&manager);

    let outcome = archive.extract(&[0, 2, 5], false, Collect::default()).unwrap();
    assert_eq!(outcome.status, HResult::S_OK);

    let collected = outcome.value;
    assert_eq!(
        collected.requested,
        vec![(0, AskMode::Extract), (2, AskMode::Extract), (5, AskMode::Extract)]
    );
    let contents: Vec<Vec<u8>> = collected.buffers.iter().map(SharedBuffer::contents).collect();
    assert_eq!(contents, vec![b"a".to_vec(), b"ccc".to_vec(), b"f".to_vec()]);
    assert_eq!(collected.results, vec![OperationResult::Ok; 3]);

    // Each item gets a fresh stream, released before the next is requested.
    let mut expected = vec![
        Event::Created("IArchiveExtractCallback"),
        Event::CallbackRegistered(true),
    ];
    for index in [0, 2, 5] {
        expected.push(Event::GetStream(index));
        expected.push(Event::Created("ISequentialOutStream"));
        expected.push(Event::Released("ISequentialOutStream"));
    }
    expected.push(Event::Released("IArchiveExtractCallback"));
    assert_eq!(take_events(), expected);
}

#[test]
fn test_extract_all_in_test_mode() {
    let manager = common::manager();
    let archive = opened(&manager);

    let collected = archive.extract_all(true, Collect::default()).unwrap().check().unwrap();
    let indices: Vec<u32> = collected.requested.iter().map(|&(index, _)| index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
    assert!(collected.requested.iter().all(|&(_, mode)| mode == AskMode::Test));
}

#[test]
fn test_skipped_items_get_no_stream() {
    struct SkipAll(u32);

    impl ArchiveExtractCallback for SkipAll {
        fn get_stream(&mut self, _index: u32, _mode: AskMode) -> HostResult<Option<Box<dyn SequentialOutStream>>> {
            self.0 += 1;
            Ok(None)
        }
    }

    let manager = common::manager();
    let archive = opened(&manager);

    let outcome = archive.extract(&[1, 3], false, SkipAll(0)).unwrap();
    assert_eq!(outcome.status, HResult::S_OK);
    assert_eq!(outcome.value.0, 2);
    assert!(!take_events().contains(&Event::Created("ISequentialOutStream")));
}

#[test]
fn test_host_status_is_forwarded() {
    struct Refuse;

    impl ArchiveExtractCallback for Refuse {
        fn get_stream(&mut self, _index: u32, _mode: AskMode) -> HostResult<Option<Box<dyn SequentialOutStream>>> {
            Err(HResult::E_ABORT)
        }
    }

    let manager = common::manager();
    let archive = opened(&manager);

    let outcome = archive.extract(&[0], false, Refuse).unwrap();
    assert_eq!(outcome.status, HResult::E_ABORT);
    assert_eq!(outcome.check().err(), Some(BridgeError::native(HResult::E_ABORT)));
}

#[test]
fn test_panicking_callback_reports_e_fail() {
    struct Panicky;

    impl ArchiveExtractCallback for Panicky {
        fn get_stream(&mut self, _index: u32, _mode: AskMode) -> HostResult<Option<Box<dyn SequentialOutStream>>> {
            panic!("host bug");
        }
    }

    let manager = common::manager();
    let archive = opened(&manager);

    let outcome = archive.extract(&[0, 1], false, Panicky).unwrap();
    assert_eq!(outcome.status, HResult::E_FAIL);

    // The engine stopped at the first failure and the bundle was still released.
    let events = take_events();
    assert_eq!(events.iter().filter(|e| matches!(e, Event::GetStream(_))).count(), 1);
    assert_eq!(events.last(), Some(&Event::Released("IArchiveExtractCallback")));

    // The archive is still usable afterwards.
    let collected = archive.extract(&[1], false, Collect::default()).unwrap().check().unwrap();
    assert_eq!(collected.buffers[0].contents(), b"bb");
}

/// Collects like [`Collect`] and answers the engine's password request.
struct Locked {
    inner: Collect,
    password: FixedPassword,
}

impl ArchiveExtractCallback for Locked {
    fn get_stream(&mut self, index: u32, mode: AskMode) -> HostResult<Option<Box<dyn SequentialOutStream>>> {
        self.inner.get_stream(index, mode)
    }

    fn password(&mut self) -> Option<&mut dyn PasswordProvider> {
        Some(&mut self.password)
    }
}

#[test]
fn test_extract_password_slot_follows_capability() {
    let manager = common::manager();
    let archive = opened(&manager);
    take_slots();

    let callback = Locked {
        inner: Collect::default(),
        password: FixedPassword("hunter2 ключ".to_string()),
    };
    let locked = archive.extract(&[1], false, callback).unwrap().check().unwrap();
    assert_eq!(locked.inner.buffers[0].contents(), b"bb");
    assert_eq!(take_slots(), vec![("IArchiveExtractCallback::password", true)]);
    let events = take_events();
    assert_eq!(events[2], Event::Password("hunter2 ключ".to_string()));
    assert_eq!(events.iter().filter(|e| matches!(e, Event::Password(_))).count(), 1);

    archive.extract(&[1], false, Collect::default()).unwrap().check().unwrap();
    assert_eq!(take_slots(), vec![("IArchiveExtractCallback::password", false)]);
    assert!(!take_events().iter().any(|e| matches!(e, Event::Password(_))));
}

#[test]
fn test_extract_password_failure_stops_extraction() {
    struct NoKey;

    impl PasswordProvider for NoKey {
        fn password(&mut self) -> HostResult<String> {
            Err(HResult::E_ABORT)
        }
    }

    struct Refused(NoKey);

    impl ArchiveExtractCallback for Refused {
        fn get_stream(&mut self, _index: u32, _mode: AskMode) -> HostResult<Option<Box<dyn SequentialOutStream>>> {
            Ok(None)
        }

        fn password(&mut self) -> Option<&mut dyn PasswordProvider> {
            Some(&mut self.0)
        }
    }

    let manager = common::manager();
    let archive = opened(&manager);

    let outcome = archive.extract(&[0], false, Refused(NoKey)).unwrap();
    assert_eq!(outcome.status, HResult::E_ABORT);
    let events = take_events();
    assert!(!events.iter().any(|e| matches!(e, Event::GetStream(_) | Event::Password(_))));
    assert_eq!(events.last(), Some(&Event::Released("IArchiveExtractCallback")));
}

struct Volumes {
    requested: Vec<String>,
}

impl VolumeProvider for Volumes {
    fn volume_property(&mut self, prop_id: PropId) -> HostResult<PropVariant> {
        Ok(if prop_id == PropId::NAME {
            "archive.001".into()
        } else {
            PropVariant::Empty
        })
    }

    fn volume_stream(&mut self, name: &str) -> HostResult<Option<Box<dyn SequentialInStream>>> {
        self.requested.push(name.to_string());
        if name == "archive.002" {
            Ok(Some(Box::new(SeekableReadStream::new(Cursor::new(b"part two".to_vec())))))
        } else {
            Ok(None)
        }
    }
}

struct MultiVolumeOpen {
    password: FixedPassword,
    volumes: Volumes,
}

impl ArchiveOpenCallback for MultiVolumeOpen {
    fn password(&mut self) -> Option<&mut dyn PasswordProvider> {
        Some(&mut self.password)
    }

    fn volumes(&mut self) -> Option<&mut dyn VolumeProvider> {
        Some(&mut self.volumes)
    }
}

#[test]
fn test_open_with_password_and_volumes() {
    take_events();
    take_slots();
    let manager = common::manager();
    let mut archive = InArchive::create(&manager, ArchiveFormat::SevenZip).unwrap();
    assert_eq!(take_events(), vec![Event::CreateObject, Event::Created("IInArchive")]);

    let callback = MultiVolumeOpen {
        password: FixedPassword("sécret 🔑".to_string()),
        volumes: Volumes { requested: Vec::new() },
    };
    let outcome = archive
        .open(SeekableReadStream::new(Cursor::new(CONTENT.to_vec())), Some(1 << 20), callback)
        .unwrap();
    assert_eq!(outcome.status, HResult::S_OK);
    assert_eq!(outcome.value.volumes.requested, vec!["archive.002", "archive.003"]);
    assert!(archive.is_open());
    assert_eq!(
        take_slots(),
        vec![
            ("IArchiveOpenCallback::password", true),
            ("IArchiveOpenCallback::volume_property", true),
            ("IArchiveOpenCallback::volume_stream", true),
        ]
    );

    assert_eq!(
        take_events(),
        vec![
            Event::Created("IInStream"),
            Event::Created("IArchiveOpenCallback"),
            Event::Password("sécret 🔑".to_string()),
            Event::VolumeName("archive.001".to_string()),
            Event::Created("IInStream"),
            Event::Volume("archive.002".to_string(), HResult::S_OK.0),
            Event::Volume("archive.003".to_string(), HResult::S_FALSE.0),
            Event::Released("IArchiveOpenCallback"),
        ]
    );

    // Input and volume streams live until close.
    archive.close();
    assert!(!archive.is_open());
    assert_eq!(
        take_events(),
        vec![
            Event::Closed,
            Event::Released("IInStream"),
            Event::Released("IInStream"),
        ]
    );

    drop(archive);
    assert_eq!(take_events(), vec![Event::Released("IInArchive")]);
}

#[test]
fn test_open_requires_seekable_stream() {
    let manager = common::manager();
    let mut archive = InArchive::create(&manager, ArchiveFormat::Zip).unwrap();

    let err = archive
        .open(ReadStream::new(&CONTENT[..]), None, NoOpenCallback)
        .unwrap_err();
    assert_eq!(err, BridgeError::MissingCapability { capability: "seek" });
    assert!(!archive.is_open());
}

#[test]
fn test_open_without_capabilities_leaves_slots_null() {
    take_events();
    take_slots();
    let manager = common::manager();
    let mut archive = InArchive::create(&manager, ArchiveFormat::SevenZip).unwrap();

    let outcome = archive
        .open(SeekableReadStream::new(Cursor::new(CONTENT.to_vec())), None, NoOpenCallback)
        .unwrap();
    assert_eq!(outcome.status, HResult::S_OK);
    assert_eq!(
        take_slots(),
        vec![
            ("IArchiveOpenCallback::password", false),
            ("IArchiveOpenCallback::volume_property", false),
            ("IArchiveOpenCallback::volume_stream", false),
        ]
    );
    assert_eq!(
        take_events(),
        vec![
            Event::CreateObject,
            Event::Created("IInArchive"),
            Event::Created("IInStream"),
            Event::Created("IArchiveOpenCallback"),
            Event::Released("IArchiveOpenCallback"),
        ]
    );
}

#[test]
fn test_item_properties() {
    let manager = common::manager();
    let archive = opened(&manager);

    assert_eq!(archive.number_of_items(), Ok(6));
    assert_eq!(archive.property(1, PropId::PATH), PropVariant::String("bb".to_string()));
    assert_eq!(archive.property(99, PropId::PATH), PropVariant::Empty);
    assert_eq!(archive.archive_property(PropId::PHY_SIZE), PropVariant::U64(CONTENT.len() as u64));

    let item = archive.item(2);
    assert_eq!(item.index, 2);
    assert_eq!(item.path, "ccc");
    assert_eq!(item.size, 3);
    assert!(!item.is_dir);
    // Properties the engine does not report fall back to defaults.
    assert_eq!(item.packed_size, 0);
    assert_eq!(item.crc, None);
    assert_eq!(item.modified, None);
}

#[test]
fn test_property_info() {
    let manager = common::manager();
    let archive = opened(&manager);

    assert_eq!(archive.number_of_properties(), Ok(2));
    assert_eq!(
        archive.property_info(0),
        PropertyInfo {
            name: None,
            id: PropId::PATH,
            var_type: VarType::BSTR,
        }
    );
    assert_eq!(archive.property_info(1).name.as_deref(), Some("Size"));

    assert_eq!(archive.number_of_archive_properties(), Ok(1));
    assert_eq!(archive.archive_property_info(0).id, PropId::PHY_SIZE);
}

/// Update callback writing a fixed list of new items.
struct NewFiles(Vec<(&'static str, &'static [u8])>);

impl ArchiveUpdateCallback for NewFiles {
    fn update_item_info(&mut self, _index: u32) -> HostResult<UpdateItemInfo> {
        Ok(UpdateItemInfo::new_item())
    }

    fn property(&mut self, index: u32, prop_id: PropId) -> HostResult<PropVariant> {
        let (name, _) = self.0.get(index as usize).ok_or(HResult::E_INVALIDARG)?;
        Ok(if prop_id == PropId::PATH {
            (*name).into()
        } else {
            PropVariant::Empty
        })
    }

    fn get_stream(&mut self, index: u32) -> HostResult<Option<Box<dyn SequentialInStream>>> {
        let (_, data) = self.0.get(index as usize).ok_or(HResult::E_INVALIDARG)?;
        Ok(Some(Box::new(ReadStream::new(*data))))
    }
}

fn new_files() -> NewFiles {
    NewFiles(vec![("one.txt", b"first"), ("two.txt", b"second")])
}

#[test]
fn test_update_items_seekable_stream() {
    take_events();
    let manager = common::manager();
    let writer = OutArchive::create(&manager, ArchiveFormat::SevenZip).unwrap();
    assert!(!writer.is_alias());
    take_events();

    let sink = SeekableWriteStream::new(Cursor::new(Vec::new()));
    let outcome = writer.update_items(sink, 2, new_files()).unwrap();
    assert_eq!(outcome.status, HResult::S_OK);

    let (sink, _callback) = outcome.value;
    assert_eq!(sink.into_inner().into_inner(), b"firstsecond");

    let events = take_events();
    assert_eq!(events[0], Event::Created("IOutStream"));
    assert!(!events.contains(&Event::Created("ISequentialOutStream")));
    assert!(events.contains(&Event::Item("one.txt".to_string())));
    assert!(events.contains(&Event::Item("two.txt".to_string())));
    // One input stream per item, each released.
    let created = events.iter().filter(|e| **e == Event::Created("ISequentialInStream")).count();
    let released = events.iter().filter(|e| **e == Event::Released("ISequentialInStream")).count();
    assert_eq!((created, released), (2, 2));
    assert_eq!(events.last(), Some(&Event::Released("IOutStream")));
}

#[test]
fn test_update_items_sequential_stream() {
    let manager = common::manager();
    let writer = OutArchive::create(&manager, ArchiveFormat::Tar).unwrap();
    take_events();

    let outcome = writer.update_items(WriteStream::new(Vec::new()), 2, new_files()).unwrap();
    let (sink, _) = outcome.check().unwrap();
    assert_eq!(sink.into_inner(), b"firstsecond");

    let events = take_events();
    assert_eq!(events[0], Event::Created("ISequentialOutStream"));
    assert!(!events.contains(&Event::Created("IOutStream")));
}

#[test]
fn test_update_password_slot_follows_capability() {
    struct Encrypted {
        files: NewFiles,
        password: FixedPassword,
    }

    impl ArchiveUpdateCallback for Encrypted {
        fn update_item_info(&mut self, index: u32) -> HostResult<UpdateItemInfo> {
            self.files.update_item_info(index)
        }

        fn property(&mut self, index: u32, prop_id: PropId) -> HostResult<PropVariant> {
            self.files.property(index, prop_id)
        }

        fn get_stream(&mut self, index: u32) -> HostResult<Option<Box<dyn SequentialInStream>>> {
            self.files.get_stream(index)
        }

        fn password(&mut self) -> Option<&mut dyn PasswordProvider> {
            Some(&mut self.password)
        }
    }

    let manager = common::manager();
    let writer = OutArchive::create(&manager, ArchiveFormat::SevenZip).unwrap();
    take_events();
    take_slots();

    let callback = Encrypted {
        files: new_files(),
        password: FixedPassword("p@ss".to_string()),
    };
    let (sink, _) = writer
        .update_items(WriteStream::new(Vec::new()), 2, callback)
        .unwrap()
        .check()
        .unwrap();
    assert_eq!(sink.into_inner(), b"firstsecond");
    assert_eq!(take_slots(), vec![("IArchiveUpdateCallback::password", true)]);
    let events = take_events();
    let asked = events.iter().position(|e| *e == Event::Password("p@ss".to_string()));
    let first_item = events.iter().position(|e| *e == Event::Item("one.txt".to_string()));
    assert!(asked.is_some() && asked < first_item);

    writer.update_items(WriteStream::new(Vec::new()), 2, new_files()).unwrap().check().unwrap();
    assert_eq!(take_slots(), vec![("IArchiveUpdateCallback::password", false)]);
    assert!(!take_events().iter().any(|e| matches!(e, Event::Password(_))));
}

#[test]
fn test_alias_is_not_released() {
    let manager = common::manager();
    let archive = InArchive::create(&manager, ArchiveFormat::SevenZip).unwrap();
    take_events();

    {
        let alias = archive.as_out_archive().unwrap();
        assert!(alias.is_alias());
        assert_eq!(alias.handle(), archive.handle());
        assert_eq!(alias.file_time_type(), FileTimeType::Unix);
    }
    assert!(take_events().is_empty());

    let writer = OutArchive::create(&manager, ArchiveFormat::SevenZip).unwrap();
    drop(writer);
    assert_eq!(
        take_events(),
        vec![
            Event::CreateObject,
            Event::Created("IOutArchive"),
            Event::Released("IOutArchive"),
        ]
    );
}

#[test]
fn test_property_setter() {
    let manager = common::manager();
    let archive = InArchive::create(&manager, ArchiveFormat::SevenZip).unwrap();
    take_events();

    let setter = archive.property_setter().unwrap();
    let status = setter
        .set_properties(&[("x", PropVariant::U32(9)), ("m", "LZMA2".into()), ("s", true.into())])
        .unwrap();
    assert_eq!(status, HResult::S_OK);
    assert_eq!(
        take_events(),
        vec![
            Event::SetProperty("x".to_string(), PropVariant::U32(9)),
            Event::SetProperty("m".to_string(), PropVariant::String("LZMA2".to_string())),
            Event::SetProperty("s".to_string(), PropVariant::Bool(true)),
        ]
    );
}

#[test]
fn test_missing_cast_fails() {
    let manager = common::manager_without(&["Cast_IOutArchive_ISetProperties"]);
    let writer = OutArchive::create(&manager, ArchiveFormat::SevenZip).unwrap();

    let err = writer.property_setter().unwrap_err();
    assert_eq!(
        err,
        BridgeError::CastFailed {
            from: "IOutArchive",
            to: "ISetProperties",
        }
    );
}
