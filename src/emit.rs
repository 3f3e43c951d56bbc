use std::io::{self, Write};

use crate::AddressSpaceSpec;

/// Writes the resolved image of `space` as assembler data in `section_name`, one `.byte`
/// directive per byte, each annotated with the register it belongs to.
pub(crate) fn write_space<W: Write>(
  w: &mut W,
  space: &AddressSpaceSpec,
  section_name: &str,
) -> io::Result<()> {
  writeln!(w, "\t.section {},\"aw\",@progbits", section_name)?;

  for register in space.registers.iter() {
    let bytes = register.bytes();
    for (n, byte) in bytes.iter().enumerate() {
      match bytes.len() {
        1 => writeln!(w, "\t.byte 0x{:02x}\t; {}", byte, register.name)?,
        _ => writeln!(w, "\t.byte 0x{:02x}\t; {}[{}]", byte, register.name, n)?,
      }
    }
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::write_space;
  use crate::{AddressSpaceSpec, FieldSpec, RegisterSpec};

  #[test]
  fn writes_one_byte_directive_per_image_byte() {
    let mut space = AddressSpaceSpec::new("FUSES", 0, 3);
    let mut low = RegisterSpec::new("LOW", 0, 8, 0x62);
    low.fields.push(FieldSpec::new("LOW", 8, 0, 0x62));
    let mut word = RegisterSpec::new("APPEND", 1, 16, 0x1234);
    word.fields.push(FieldSpec::new("APPEND", 16, 0, 0x1234));
    space.registers.push(low);
    space.registers.push(word);

    let mut out = Vec::new();
    write_space(&mut out, &space, ".fuse").unwrap();

    assert_eq!(
      "\t.section .fuse,\"aw\",@progbits\n\
       \t.byte 0x62\t; LOW\n\
       \t.byte 0x34\t; APPEND[0]\n\
       \t.byte 0x12\t; APPEND[1]\n",
      String::from_utf8(out).unwrap()
    );
  }
}
