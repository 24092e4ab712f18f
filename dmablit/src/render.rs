use gles31::*;

use crate::{egl_ffi, DmabufImage, EglContext, Error, Result, Rotation};

// From GL_OES_EGL_image_external; gles31 does not export extension enums.
pub(crate) const GL_TEXTURE_EXTERNAL_OES: u32 = 0x8D65;

const VERTEX_SHADER: &[u8] = b"
attribute vec2 position;
attribute vec2 texcoord;
varying vec2 v_texcoord;
void main() {
    gl_Position = vec4(position, 0.0, 1.0);
    v_texcoord = texcoord;
}\0";

const FRAGMENT_SHADER: &[u8] = b"
#extension GL_OES_EGL_image_external : require
precision mediump float;
uniform samplerExternalOES tex;
varying vec2 v_texcoord;
void main() {
    gl_FragColor = texture2D(tex, v_texcoord);
}\0";

// Full-screen quad as a triangle strip.
const QUAD_POSITIONS: [f32; 8] = [-1.0, -1.0, 1.0, -1.0, -1.0, 1.0, 1.0, 1.0];

/// Draws one DMA-BUF into another as a full-target textured quad.
///
/// The source is sampled as `GL_TEXTURE_EXTERNAL_OES`, so YUV sources are
/// converted to RGB by the driver. The quad's texture coordinates implement
/// the rotation.
pub struct QuadRenderer {
    program: u32,
    position_loc: u32,
    texcoord_loc: u32,
    vbo_pos: u32,
    vbo_tex: u32,
    fbo: u32,
    rbo: u32,
    texture: u32,
    uploaded_rotation: Option<Rotation>,
}

impl QuadRenderer {
    /// Set up GL state in `context`. Requires GLES 2 and the
    /// `GL_OES_EGL_image_external` extension. The context stays current.
    pub fn new(context: &EglContext) -> Result<Self> {
        context.make_current()?;

        unsafe {
            load_gl_functions(&|name| egl_ffi::eglGetProcAddress(name as *const _))
                .map_err(|_| Error::GlLoad("eglGetProcAddress returned null".into()))?
        };

        let program = unsafe {
            let vs = compile_shader(GL_VERTEX_SHADER, VERTEX_SHADER)?;
            let fs = compile_shader(GL_FRAGMENT_SHADER, FRAGMENT_SHADER)?;
            let program = link_program(vs, fs)?;
            glDeleteShader(vs);
            glDeleteShader(fs);
            program
        };

        let position_loc = unsafe { glGetAttribLocation(program, b"position\0".as_ptr().cast()) };
        if position_loc < 0 {
            return Err(Error::MissingAttribute("position"));
        }
        let texcoord_loc = unsafe { glGetAttribLocation(program, b"texcoord\0".as_ptr().cast()) };
        if texcoord_loc < 0 {
            return Err(Error::MissingAttribute("texcoord"));
        }

        let mut vbo = [0u32; 2];
        let mut fbo = 0;
        let mut rbo = 0;
        let mut texture = 0;

        unsafe {
            glGenBuffers(2, vbo.as_mut_ptr());
            glBindBuffer(GL_ARRAY_BUFFER, vbo[0]);
            glBufferData(
                GL_ARRAY_BUFFER,
                std::mem::size_of_val(&QUAD_POSITIONS) as _,
                QUAD_POSITIONS.as_ptr() as *const _,
                GL_STATIC_DRAW,
            );

            glGenFramebuffers(1, &mut fbo);
            glGenRenderbuffers(1, &mut rbo);
            glGenTextures(1, &mut texture);

            glBindTexture(GL_TEXTURE_EXTERNAL_OES, texture);
            glTexParameteri(GL_TEXTURE_EXTERNAL_OES, GL_TEXTURE_MIN_FILTER, GL_LINEAR as i32);
            glTexParameteri(GL_TEXTURE_EXTERNAL_OES, GL_TEXTURE_MAG_FILTER, GL_LINEAR as i32);
            glTexParameteri(
                GL_TEXTURE_EXTERNAL_OES,
                GL_TEXTURE_WRAP_S,
                GL_CLAMP_TO_EDGE as i32,
            );
            glTexParameteri(
                GL_TEXTURE_EXTERNAL_OES,
                GL_TEXTURE_WRAP_T,
                GL_CLAMP_TO_EDGE as i32,
            );
        }

        check_gl_error()?;

        Ok(Self {
            program,
            position_loc: position_loc as u32,
            texcoord_loc: texcoord_loc as u32,
            vbo_pos: vbo[0],
            vbo_tex: vbo[1],
            fbo,
            rbo,
            texture,
            uploaded_rotation: None,
        })
    }

    /// Direct all subsequent draws into `target`.
    pub fn set_target(&self, target: &DmabufImage) -> Result<()> {
        unsafe {
            glBindFramebuffer(GL_FRAMEBUFFER, self.fbo);
            glBindRenderbuffer(GL_RENDERBUFFER, self.rbo);
            target.set_as_gl_renderbuffer_storage();
            glFramebufferRenderbuffer(
                GL_FRAMEBUFFER,
                GL_COLOR_ATTACHMENT0,
                GL_RENDERBUFFER,
                self.rbo,
            );

            let status = glCheckFramebufferStatus(GL_FRAMEBUFFER);
            if status != GL_FRAMEBUFFER_COMPLETE {
                return Err(Error::IncompleteFramebuffer(status));
            }
        }
        check_gl_error()
    }

    /// Sample from `source` in subsequent draws.
    pub fn bind_source(&self, source: &DmabufImage) -> Result<()> {
        unsafe {
            glActiveTexture(GL_TEXTURE0);
            glBindTexture(GL_TEXTURE_EXTERNAL_OES, self.texture);
            source.set_as_gl_texture(GL_TEXTURE_EXTERNAL_OES);
        }
        check_gl_error()
    }

    /// Draw the bound source into the bound target, rotated by `rotation`.
    pub fn draw(&mut self, width: u32, height: u32, rotation: Rotation) -> Result<()> {
        unsafe {
            glViewport(0, 0, width as _, height as _);
            glClearColor(0.0, 0.0, 1.0, 1.0);
            glClear(GL_COLOR_BUFFER_BIT);

            glUseProgram(self.program);

            glBindBuffer(GL_ARRAY_BUFFER, self.vbo_pos);
            glVertexAttribPointer(self.position_loc, 2, GL_FLOAT, 0, 0, std::ptr::null());
            glEnableVertexAttribArray(self.position_loc);

            glBindBuffer(GL_ARRAY_BUFFER, self.vbo_tex);
            if self.uploaded_rotation != Some(rotation) {
                let texcoords = rotation.texcoords();
                glBufferData(
                    GL_ARRAY_BUFFER,
                    std::mem::size_of_val(&texcoords) as _,
                    texcoords.as_ptr() as *const _,
                    GL_STATIC_DRAW,
                );
                self.uploaded_rotation = Some(rotation);
            }
            glVertexAttribPointer(self.texcoord_loc, 2, GL_FLOAT, 0, 0, std::ptr::null());
            glEnableVertexAttribArray(self.texcoord_loc);

            glDrawArrays(GL_TRIANGLE_STRIP, 0, 4);
            glFinish();
        }
        check_gl_error()
    }

    /// Read the bound target back as tightly packed RGBA.
    pub fn read_pixels(&self, width: u32, height: u32) -> Result<Vec<u8>> {
        let mut pixels = vec![0u8; width as usize * height as usize * 4];
        unsafe {
            glPixelStorei(GL_PACK_ALIGNMENT, 1);
            glReadPixels(
                0,
                0,
                width as _,
                height as _,
                GL_RGBA,
                GL_UNSIGNED_BYTE,
                pixels.as_mut_ptr() as *mut _,
            );
        }
        check_gl_error()?;
        Ok(pixels)
    }
}

impl Drop for QuadRenderer {
    fn drop(&mut self) {
        // Requires the context to still be current; deleting names from a
        // dead context is a no-op.
        unsafe {
            glDeleteTextures(1, &self.texture);
            glDeleteRenderbuffers(1, &self.rbo);
            glDeleteFramebuffers(1, &self.fbo);
            glDeleteBuffers(2, [self.vbo_pos, self.vbo_tex].as_ptr());
            glDeleteProgram(self.program);
        }
    }
}

unsafe fn compile_shader(kind: u32, src: &'static [u8]) -> Result<u32> {
    unsafe {
        let shader = glCreateShader(kind);
        glShaderSource(shader, 1, &(src.as_ptr() as _), std::ptr::null());
        glCompileShader(shader);

        let mut success = 0;
        glGetShaderiv(shader, GL_COMPILE_STATUS, &mut success);
        if success != 1 {
            let mut log = [0u8; 1024];
            let mut len = 0;
            glGetShaderInfoLog(shader, log.len() as _, &mut len, log.as_mut_ptr() as *mut _);
            let msg = String::from_utf8_lossy(&log[..len as usize]).into_owned();
            glDeleteShader(shader);
            return Err(Error::ShaderCompile(msg));
        }

        Ok(shader)
    }
}

unsafe fn link_program(vs: u32, fs: u32) -> Result<u32> {
    unsafe {
        let program = glCreateProgram();
        glAttachShader(program, vs);
        glAttachShader(program, fs);
        glLinkProgram(program);

        let mut success = 0;
        glGetProgramiv(program, GL_LINK_STATUS, &mut success);
        if success != 1 {
            let mut log = [0u8; 1024];
            let mut len = 0;
            glGetProgramInfoLog(program, log.len() as _, &mut len, log.as_mut_ptr() as *mut _);
            let msg = String::from_utf8_lossy(&log[..len as usize]).into_owned();
            glDeleteProgram(program);
            return Err(Error::ProgramLink(msg));
        }

        Ok(program)
    }
}

fn check_gl_error() -> Result<()> {
    let err = unsafe { glGetError() };
    if err == GL_NO_ERROR {
        Ok(())
    } else {
        Err(Error::Gl(err))
    }
}
