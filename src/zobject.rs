/// Z-Machine object system, version 3 layout.
///
/// The object table is 31 default-property words followed by 9-byte
/// entries indexed from 1:
/// - bytes 0..3: 32 attribute bits, attribute 0 at the MSB of byte 0
/// - byte 4: parent, byte 5: sibling, byte 6: first child
/// - bytes 7..8: property block address
use crate::errors::{ZError, ZResult};
use crate::story::Story;
use crate::text;
use log::debug;

pub const MAX_OBJECTS: u16 = 255;
pub const MAX_ATTRIBUTES: u16 = 31;
pub const MAX_PROPERTIES: u16 = 31;
pub const OBJECT_ENTRY_SIZE: u32 = 9;

pub trait ObjectTree: Sized {
    /// Objects present in the image. The count is not stored; it is derived
    /// from the assumption that object 1's property block immediately
    /// follows the object entries. Widely relied upon, not mandated.
    fn object_count(&self) -> ZResult<u16>;
    fn object_address(&self, obj: u16) -> ZResult<u32>;
    fn object_name(&self, obj: u16) -> ZResult<String>;
    fn parent(&self, obj: u16) -> ZResult<u16>;
    fn sibling(&self, obj: u16) -> ZResult<u16>;
    fn child(&self, obj: u16) -> ZResult<u16>;
    fn set_parent(&self, obj: u16, parent: u16) -> ZResult<Self>;
    fn set_sibling(&self, obj: u16, sibling: u16) -> ZResult<Self>;
    fn set_child(&self, obj: u16, child: u16) -> ZResult<Self>;
    fn test_attribute(&self, obj: u16, attr: u16) -> ZResult<bool>;
    fn set_attribute(&self, obj: u16, attr: u16) -> ZResult<Self>;
    fn clear_attribute(&self, obj: u16, attr: u16) -> ZResult<Self>;
    fn default_property(&self, prop: u16) -> ZResult<u16>;
    fn property(&self, obj: u16, prop: u16) -> ZResult<u16>;
    fn set_property(&self, obj: u16, prop: u16, value: u16) -> ZResult<Self>;
    fn property_address(&self, obj: u16, prop: u16) -> ZResult<u16>;
    fn next_property(&self, obj: u16, prop: u16) -> ZResult<u16>;
    fn property_length(&self, prop_addr: u16) -> ZResult<u16>;
    /// Detach an object from its parent, splicing the sibling chain.
    fn remove_object(&self, obj: u16) -> ZResult<Self>;
    /// Remove `obj` from wherever it is and make it the first child of
    /// `destination`.
    fn insert_object(&self, obj: u16, destination: u16) -> ZResult<Self>;
}

/// Walk state for the descending-numbered property list of one object.
struct PropertyCursor {
    addr: u32,
    number: u16,
    length: u16,
}

impl Story {
    fn tree_base(&self) -> ZResult<u32> {
        Ok(self.object_table_base()? + 2 * MAX_PROPERTIES as u32)
    }

    fn check_object(&self, obj: u16) -> ZResult<u16> {
        if obj == 0 || obj > MAX_OBJECTS {
            return Err(ZError::InvalidObject(obj));
        }
        Ok(obj)
    }

    /// Address of the first property entry, past the object's short name.
    fn first_property_entry(&self, obj: u16) -> ZResult<u32> {
        let block = self.read_word(self.object_address(obj)? + 7)? as u32;
        let name_words = self.read_byte(block)? as u32;
        Ok(block + 1 + 2 * name_words)
    }

    fn property_cursor_at(&self, addr: u32) -> ZResult<Option<PropertyCursor>> {
        let header = self.read_byte(addr)?;
        if header == 0 {
            return Ok(None);
        }
        Ok(Some(PropertyCursor {
            addr: addr + 1,
            number: (header & 0x1F) as u16,
            length: ((header >> 5) & 0x07) as u16 + 1,
        }))
    }

    /// Find one property of an object, or None when absent.
    fn find_property(&self, obj: u16, prop: u16) -> ZResult<Option<PropertyCursor>> {
        let mut addr = self.first_property_entry(obj)?;
        while let Some(cursor) = self.property_cursor_at(addr)? {
            // entries are sorted in descending property-number order
            if cursor.number == prop {
                return Ok(Some(cursor));
            }
            if cursor.number < prop {
                return Ok(None);
            }
            addr = cursor.addr + cursor.length as u32;
        }
        Ok(None)
    }

    fn attribute_location(&self, obj: u16, attr: u16) -> ZResult<(u32, u8)> {
        let addr = self.object_address(obj)? + attr as u32 / 8;
        let mask = 0x80u8 >> (attr % 8);
        Ok((addr, mask))
    }
}

impl ObjectTree for Story {
    fn object_count(&self) -> ZResult<u16> {
        let tree = self.tree_base()?;
        let first_props = self.read_word(self.object_address(1)? + 7)? as u32;
        Ok(((first_props - tree) / OBJECT_ENTRY_SIZE) as u16)
    }

    fn object_address(&self, obj: u16) -> ZResult<u32> {
        let obj = self.check_object(obj)?;
        Ok(self.tree_base()? + (obj as u32 - 1) * OBJECT_ENTRY_SIZE)
    }

    fn object_name(&self, obj: u16) -> ZResult<String> {
        let block = self.read_word(self.object_address(obj)? + 7)? as u32;
        if self.read_byte(block)? == 0 {
            return Ok(String::new());
        }
        Ok(text::decode_string(self, block + 1)?.text)
    }

    fn parent(&self, obj: u16) -> ZResult<u16> {
        Ok(self.read_byte(self.object_address(obj)? + 4)? as u16)
    }

    fn sibling(&self, obj: u16) -> ZResult<u16> {
        Ok(self.read_byte(self.object_address(obj)? + 5)? as u16)
    }

    fn child(&self, obj: u16) -> ZResult<u16> {
        Ok(self.read_byte(self.object_address(obj)? + 6)? as u16)
    }

    fn set_parent(&self, obj: u16, parent: u16) -> ZResult<Story> {
        self.write_byte(self.object_address(obj)? + 4, parent as u8)
    }

    fn set_sibling(&self, obj: u16, sibling: u16) -> ZResult<Story> {
        self.write_byte(self.object_address(obj)? + 5, sibling as u8)
    }

    fn set_child(&self, obj: u16, child: u16) -> ZResult<Story> {
        self.write_byte(self.object_address(obj)? + 6, child as u8)
    }

    fn test_attribute(&self, obj: u16, attr: u16) -> ZResult<bool> {
        if attr > MAX_ATTRIBUTES {
            debug!("attribute {attr} out of range for object {obj}");
            return Ok(false);
        }
        let (addr, mask) = self.attribute_location(obj, attr)?;
        Ok(self.read_byte(addr)? & mask != 0)
    }

    fn set_attribute(&self, obj: u16, attr: u16) -> ZResult<Story> {
        if attr > MAX_ATTRIBUTES {
            debug!("set of out-of-range attribute {attr} on object {obj} ignored");
            return Ok(self.clone());
        }
        let (addr, mask) = self.attribute_location(obj, attr)?;
        let byte = self.read_byte(addr)?;
        self.write_byte(addr, byte | mask)
    }

    fn clear_attribute(&self, obj: u16, attr: u16) -> ZResult<Story> {
        if attr > MAX_ATTRIBUTES {
            debug!("clear of out-of-range attribute {attr} on object {obj} ignored");
            return Ok(self.clone());
        }
        let (addr, mask) = self.attribute_location(obj, attr)?;
        let byte = self.read_byte(addr)?;
        self.write_byte(addr, byte & !mask)
    }

    fn default_property(&self, prop: u16) -> ZResult<u16> {
        if prop == 0 || prop > MAX_PROPERTIES {
            return Err(ZError::InvalidDefaultProperty(prop));
        }
        self.read_word(self.object_table_base()? + 2 * (prop as u32 - 1))
    }

    fn property(&self, obj: u16, prop: u16) -> ZResult<u16> {
        match self.find_property(obj, prop)? {
            Some(cursor) => match cursor.length {
                1 => Ok(self.read_byte(cursor.addr)? as u16),
                2 => self.read_word(cursor.addr),
                _ => Err(ZError::InvalidProperty { obj, prop }),
            },
            None => self.default_property(prop),
        }
    }

    fn set_property(&self, obj: u16, prop: u16, value: u16) -> ZResult<Story> {
        match self.find_property(obj, prop)? {
            Some(cursor) => match cursor.length {
                1 => self.write_byte(cursor.addr, (value & 0xFF) as u8),
                2 => self.write_word(cursor.addr, value),
                _ => Err(ZError::InvalidProperty { obj, prop }),
            },
            None => Err(ZError::InvalidProperty { obj, prop }),
        }
    }

    fn property_address(&self, obj: u16, prop: u16) -> ZResult<u16> {
        match self.find_property(obj, prop)? {
            Some(cursor) => Ok(cursor.addr as u16),
            None => Ok(0),
        }
    }

    fn next_property(&self, obj: u16, prop: u16) -> ZResult<u16> {
        let mut addr = self.first_property_entry(obj)?;
        if prop == 0 {
            return Ok(self
                .property_cursor_at(addr)?
                .map(|c| c.number)
                .unwrap_or(0));
        }
        while let Some(cursor) = self.property_cursor_at(addr)? {
            addr = cursor.addr + cursor.length as u32;
            if cursor.number == prop {
                return Ok(self
                    .property_cursor_at(addr)?
                    .map(|c| c.number)
                    .unwrap_or(0));
            }
        }
        Err(ZError::InvalidProperty { obj, prop })
    }

    fn property_length(&self, prop_addr: u16) -> ZResult<u16> {
        if prop_addr == 0 {
            return Ok(0);
        }
        // the size byte sits just before the property data
        let header = self.read_byte(prop_addr as u32 - 1)?;
        Ok(((header >> 5) & 0x07) as u16 + 1)
    }

    fn remove_object(&self, obj: u16) -> ZResult<Story> {
        let parent = self.parent(obj)?;
        if parent == 0 {
            return Ok(self.clone());
        }
        debug!("remove_object {obj} from parent {parent}");

        let mut story = self.clone();
        let first = story.child(parent)?;
        if first == obj {
            let next = story.sibling(obj)?;
            story = story.set_child(parent, next)?;
        } else {
            // walk the sibling chain to the predecessor
            let mut prev = first;
            loop {
                let next = story.sibling(prev)?;
                if next == obj {
                    break;
                }
                if next == 0 {
                    return Err(ZError::InvalidObject(obj));
                }
                prev = next;
            }
            let after = story.sibling(obj)?;
            story = story.set_sibling(prev, after)?;
        }
        story = story.set_parent(obj, 0)?;
        story.set_sibling(obj, 0)
    }

    fn insert_object(&self, obj: u16, destination: u16) -> ZResult<Story> {
        self.check_object(destination)?;
        debug!("insert_object {obj} into {destination}");
        let story = self.remove_object(obj)?;
        let old_first = story.child(destination)?;
        let story = story.set_sibling(obj, old_first)?;
        let story = story.set_child(destination, obj)?;
        story.set_parent(obj, destination)
    }
}
